//! Mesh assembly.
//!
//! [`MeshAssembler`] turns the samples of one mesh schema into a flat
//! [`GeometryRecord`] for a request:
//!
//! 1. Mesh samples are pulled for the motion times (render time only for
//!    topology-varying meshes).
//! 2. Face counts and corner indices come from the render-time sample and
//!    are validated; a [`CornerPermutation`] records the winding change.
//! 3. Positions are read per motion time, or extrapolated from velocities
//!    when the topology varies.
//! 4. Normals and UV sets are resolved independently and dropped with a
//!    warning when their samples disagree.
//! 5. Attributes are classified, corner buckets permuted, and tangent
//!    frames derived for the requested UV sets.
//!
//! Structural problems fail the whole shape with `Error::NoGeometry`.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, info, instrument, warn};

use super::tangents::{compute_tangents, smooth_normals};
use super::{CornerPermutation, ExpandRequest, ExpandSettings};
use crate::core::{SampleSource, TimeSampleSeries, TopologyVariance};
use crate::geom::{
    AttributeBuckets, AttributeCategory, AttributeClassifier, AttributeRecord, AttributeSample,
    AttributeValues, ElementType, GeomParam, IndexedSample, MeshSchema, PolyMeshSample,
    DEFAULT_UV_SET,
};
use crate::util::{BBox3d, Chrono, Error, Lerp, Result};

const VELOCITY_NAMES: [&str; 2] = ["velocity", "v"];
const ACCELERATION_NAMES: [&str; 3] = ["acceleration", "accel", "a"];

/// Normals with their per-corner index buffer.
///
/// With one motion key, `values` are the source values and `indices` maps
/// output corners into them. With several keys, `values` holds one
/// per-corner block per key and `indices` is the identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalBuffer {
    pub values: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub motion_keys: usize,
}

impl NormalBuffer {
    /// Values of motion key `key`.
    pub fn block(&self, key: usize) -> &[Vec3] {
        let n = self.values.len() / self.motion_keys.max(1);
        self.values.get(key * n..(key + 1) * n).unwrap_or(&[])
    }
}

/// One UV set: values plus per-output-corner indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UvBuffer {
    pub values: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl UvBuffer {
    /// UV of output corner `corner`.
    pub fn corner(&self, corner: usize) -> Option<Vec2> {
        self.values.get(*self.indices.get(corner)? as usize).copied()
    }
}

/// Renderer-ready geometry of one shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    /// Path of the geometry node.
    pub path: String,
    /// `motion_keys` blocks of `point_count` positions.
    pub positions: Vec<Vec3>,
    pub motion_keys: usize,
    pub point_count: usize,
    pub face_counts: Vec<u32>,
    /// Point index of every output corner.
    pub vertex_indices: Vec<u32>,
    pub normals: Option<NormalBuffer>,
    /// UV sets by name; the default set uses an empty name.
    pub uv_sets: BTreeMap<String, UvBuffer>,
    pub attributes: AttributeBuckets,
    /// Object space bounds over all motion keys.
    pub bounds: BBox3d,
    pub subdivision: bool,
}

impl GeometryRecord {
    /// Positions as a flat `x, y, z` float buffer.
    pub fn positions_as_f32(&self) -> &[f32] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Positions of motion key `key`.
    pub fn position_block(&self, key: usize) -> &[Vec3] {
        let n = self.point_count;
        self.positions.get(key * n..(key + 1) * n).unwrap_or(&[])
    }

    pub fn num_faces(&self) -> usize {
        self.face_counts.len()
    }

    pub fn num_corners(&self) -> usize {
        self.vertex_indices.len()
    }

    pub fn uv_set(&self, name: &str) -> Option<&UvBuffer> {
        self.uv_sets.get(name)
    }

    /// Derived tangent and bitangent records of a UV set.
    pub fn tangent_frame(&self, set: &str) -> Option<(&AttributeRecord, &AttributeRecord)> {
        let t = self.attributes.get(AttributeCategory::Point, &format!("T{set}"))?;
        let b = self.attributes.get(AttributeCategory::Point, &format!("B{set}"))?;
        Some((t, b))
    }
}

/// Validated face data of the topology sample.
struct Topology {
    face_counts: Vec<u32>,
    vertex_indices: Vec<u32>,
    perm: CornerPermutation,
}

impl Topology {
    fn new(path: &str, sample: &PolyMeshSample, reverse: bool) -> Result<Self> {
        if !sample.is_valid() {
            return Err(Error::no_geometry(path, "missing positions or face data"));
        }
        let perm = CornerPermutation::new(&sample.face_counts, reverse)
            .map_err(|e| Error::no_geometry(path, e.to_string()))?;
        if perm.len() != sample.face_indices.len() {
            return Err(Error::no_geometry(
                path,
                format!("face counts cover {} corners, {} indices", perm.len(), sample.face_indices.len()),
            ));
        }
        let num_points = sample.positions.len();
        let source: Vec<u32> = sample
            .face_indices
            .iter()
            .map(|&i| u32::try_from(i).ok().filter(|&i| (i as usize) < num_points))
            .collect::<Option<_>>()
            .ok_or_else(|| Error::no_geometry(path, "corner index out of range"))?;

        let vertex_indices = perm
            .apply(&source)
            .ok_or_else(|| Error::no_geometry(path, "corner count mismatch"))?;
        Ok(Self {
            face_counts: sample.face_counts.iter().map(|&c| c as u32).collect(),
            vertex_indices,
            perm,
        })
    }
}

/// Builds [`GeometryRecord`]s for one request.
#[derive(Clone, Copy, Debug)]
pub struct MeshAssembler<'a> {
    settings: &'a ExpandSettings,
    request: &'a ExpandRequest,
}

impl<'a> MeshAssembler<'a> {
    pub fn new(settings: &'a ExpandSettings, request: &'a ExpandRequest) -> Self {
        Self { settings, request }
    }

    fn render_time(&self) -> Chrono {
        self.request.render_time
    }

    /// Motion times used for deformation (render time only without deform blur).
    fn motion_times(&self) -> SmallVec<[Chrono; 4]> {
        if self.settings.ignore_deform_blur || !self.request.is_motion_blurred() {
            smallvec![self.render_time()]
        } else {
            self.request.sample_times()
        }
    }

    /// Assemble `mesh` (the node at `path`).
    #[instrument(skip_all, fields(path = %path))]
    pub fn assemble(&self, path: &str, mesh: &MeshSchema, subdivision: bool) -> Result<GeometryRecord> {
        let render_time = self.render_time();
        let varying = mesh.topology_variance().is_varying();
        let motion_times = self.motion_times();
        let sample_times: SmallVec<[Chrono; 4]> = if varying {
            smallvec![render_time]
        } else {
            motion_times.clone()
        };

        let mut samples = TimeSampleSeries::new();
        for &t in &sample_times {
            samples.update(&mesh.samples, t, t, !varying)?;
        }
        let Some(base) = samples.get_samples(render_time) else {
            return Err(Error::no_geometry(path, "no mesh sample"));
        };
        debug!(samples = samples.len(), varying, "Read mesh samples");

        let topo = Topology::new(path, &base.sample0.data, self.settings.reverse_winding)?;
        let point_count = base.sample0.data.positions.len();
        let single = varying || samples.len() == 1;

        // Attributes
        let (attr_time, interpolate_attrs) = if varying {
            (render_time, false)
        } else {
            (self.settings.attributes_time(self.request), true)
        };
        let mut classifier = AttributeClassifier::new(&self.settings.attributes);
        for name in [&self.settings.velocity_name, &self.settings.acceleration_name]
            .into_iter()
            .flatten()
        {
            classifier = classifier.with_reserved(name);
        }
        let classified = classifier.classify(&mesh.arb_geom_params, attr_time, interpolate_attrs);
        let mut attributes = classified.buckets;

        // Positions at render time (topology sample, blended when possible)
        let render_positions = {
            let p0 = &base.sample0.data.positions;
            let p1 = &base.sample1.data.positions;
            if !single && base.blend > 0.0 && p1.len() == point_count {
                p0.interp(p1, base.blend)
            } else {
                p0.clone()
            }
        };

        let use_velocity =
            motion_times.len() > 1 && (varying || self.settings.force_velocity_blur);
        let (positions, motion_keys) = if use_velocity {
            match self.velocities(&base.sample0.data, &attributes.point, point_count) {
                Some((vel, acc)) => {
                    debug!(acceleration = acc.is_some(), "Extrapolate positions from velocities");
                    self.extrapolate(&render_positions, &vel, acc.as_deref(), &motion_times)
                }
                None => (render_positions.clone(), 1),
            }
        } else if single {
            (render_positions.clone(), 1)
        } else {
            let mut out = Vec::with_capacity(point_count * motion_times.len());
            for &t in &motion_times {
                let b = samples
                    .get_samples(t)
                    .ok_or_else(|| Error::no_geometry(path, "no mesh sample"))?;
                let p0 = &b.sample0.data.positions;
                let p1 = &b.sample1.data.positions;
                if p0.len() != point_count || (b.blend > 0.0 && p1.len() != point_count) {
                    return Err(Error::no_geometry(path, "changing point count amongst samples"));
                }
                if b.blend > 0.0 {
                    out.extend(p0.iter().zip(p1).map(|(a, c)| a.interp(c, b.blend)));
                } else {
                    out.extend_from_slice(p0);
                }
            }
            (out, motion_times.len())
        };

        // Subdivided surfaces get their normals from the renderer's limit surface.
        let normals = match (&mesh.normals, self.settings.read_normals && !subdivision) {
            (Some(param), true) => self.normals(path, param, single, &sample_times, &topo.perm),
            _ => None,
        };

        let mut uv_sets = BTreeMap::new();
        if let Some(uvs) = &mesh.uvs {
            let uv = self.uv_set(path, DEFAULT_UV_SET, uvs, |s: &IndexedSample<Vec2>| Some(s.clone()), !varying, &topo.perm);
            if let Some(uv) = uv {
                uv_sets.insert(DEFAULT_UV_SET.to_string(), uv);
            }
        }
        for (set, prop) in classified.uv_sets {
            if let Some(uv) = self.uv_set(path, &set, prop, uv_from_attribute, !varying, &topo.perm) {
                uv_sets.insert(set, uv);
            }
        }

        retain_counts(&mut attributes.primitive, topo.face_counts.len(), path);
        retain_counts(&mut attributes.point, point_count, path);
        retain_counts(&mut attributes.corner, topo.perm.len(), path);
        for record in &mut attributes.corner {
            record.reorder(topo.perm.as_slice());
        }

        let mut geometry = GeometryRecord {
            path: path.to_string(),
            bounds: BBox3d::from_points(&positions),
            positions,
            motion_keys,
            point_count,
            face_counts: topo.face_counts,
            vertex_indices: topo.vertex_indices,
            normals,
            uv_sets,
            attributes,
            subdivision,
        };

        let sets: Vec<String> = geometry
            .uv_sets
            .keys()
            .filter(|s| self.settings.computes_tangents(s))
            .cloned()
            .collect();
        for set in sets {
            self.add_tangents(&mut geometry, &set, &render_positions);
        }

        if self.settings.verbose {
            info!(
                faces = geometry.num_faces(),
                points = geometry.point_count,
                corners = geometry.num_corners(),
                keys = geometry.motion_keys,
                uv_sets = geometry.uv_sets.len(),
                attributes = geometry.attributes.len(),
                "Mesh assembled"
            );
        } else {
            debug!(faces = geometry.num_faces(), keys = geometry.motion_keys, "Mesh assembled");
        }
        Ok(geometry)
    }

    /// Velocity (and acceleration) for `point_count` points.
    fn velocities(
        &self,
        sample: &PolyMeshSample,
        points: &[AttributeRecord],
        point_count: usize,
    ) -> Option<(Vec<Vec3>, Option<Vec<Vec3>>)> {
        let vel = self
            .settings
            .velocity_name
            .as_deref()
            .and_then(|name| point_vectors(points, name, point_count))
            .or_else(|| sample.velocities.clone().filter(|v| v.len() == point_count))
            .or_else(|| VELOCITY_NAMES.iter().find_map(|name| point_vectors(points, name, point_count)))?;

        let acc = self
            .settings
            .acceleration_name
            .as_deref()
            .and_then(|name| point_vectors(points, name, point_count))
            .or_else(|| ACCELERATION_NAMES.iter().find_map(|name| point_vectors(points, name, point_count)));

        Some((vel, acc))
    }

    /// `p + dt * (v + 0.5 * dt * a)` for every motion time.
    fn extrapolate(
        &self,
        base: &[Vec3],
        vel: &[Vec3],
        acc: Option<&[Vec3]>,
        times: &[Chrono],
    ) -> (Vec<Vec3>, usize) {
        let mut out = Vec::with_capacity(base.len() * times.len());
        for &t in times {
            let dt = ((t - self.render_time()) * self.settings.velocity_scale) as f32;
            match acc {
                Some(acc) => out.extend(
                    base.iter()
                        .zip(vel)
                        .zip(acc)
                        .map(|((p, v), a)| *p + dt * (*v + 0.5 * dt * *a)),
                ),
                None => out.extend(base.iter().zip(vel).map(|(p, v)| *p + dt * *v)),
            }
        }
        (out, times.len())
    }

    fn normals(
        &self,
        path: &str,
        param: &GeomParam<Vec3>,
        single: bool,
        times: &[Chrono],
        perm: &CornerPermutation,
    ) -> Option<NormalBuffer> {
        let mut series = TimeSampleSeries::new();
        for &t in times {
            if let Err(e) = series.update(param, t, t, !single) {
                warn!(path, error = %e, "Ignore normals: read failed");
                return None;
            }
        }
        if series.is_empty() {
            return None;
        }

        if single || series.len() == 1 {
            let b = series.get_samples(self.render_time())?;
            let s = &b.sample0.data;
            if s.len() != perm.len() || !s.indices_in_range() {
                warn!(path, normals = s.len(), corners = perm.len(), "Ignore normals: corner count mismatch");
                return None;
            }
            let indices = match &s.indices {
                Some(idx) => perm.apply(idx)?,
                None => perm.source_indices(),
            };
            return Some(NormalBuffer {
                values: s.values.clone(),
                indices,
                motion_keys: 1,
            });
        }

        let mut values = Vec::with_capacity(perm.len() * times.len());
        for &t in times {
            let b = series.get_samples(t)?;
            let s0 = &b.sample0.data;
            let block = if b.blend > 0.0 {
                s0.blended(&b.sample1.data, b.blend)
            } else {
                s0.expanded()
            };
            match block.and_then(|v| perm.apply(&v)) {
                Some(v) => values.extend(v),
                None => {
                    warn!(path, time = t, "Ignore normals: non uniform samples");
                    return None;
                }
            }
        }
        Some(NormalBuffer {
            values,
            indices: (0..perm.len() as u32).collect(),
            motion_keys: times.len(),
        })
    }

    /// Resolve one UV set at render time.
    fn uv_set<S, T, F>(
        &self,
        path: &str,
        set: &str,
        source: &S,
        convert: F,
        interpolate: bool,
        perm: &CornerPermutation,
    ) -> Option<UvBuffer>
    where
        S: SampleSource<T> + ?Sized,
        T: Clone,
        F: Fn(&T) -> Option<IndexedSample<Vec2>>,
    {
        let t = self.render_time();
        let mut series = TimeSampleSeries::new();
        if let Err(e) = series.update(source, t, t, interpolate) {
            warn!(path, set, error = %e, "Ignore UVs: read failed");
            return None;
        }
        let b = series.get_samples(t)?;
        let Some(s0) = convert(&b.sample0.data) else {
            warn!(path, set, "Ignore UVs: unsupported values");
            return None;
        };

        if interpolate && b.blend > 0.0 {
            let s1 = convert(&b.sample1.data)?;
            if s0.len() != s1.len() {
                warn!(path, set, "Ignore UVs: samples topology don't match");
                return None;
            }
            let values = s0.blended(&s1, b.blend)?;
            if values.len() != perm.len() {
                warn!(path, set, uvs = values.len(), corners = perm.len(), "Ignore UVs: corner count mismatch");
                return None;
            }
            return Some(UvBuffer {
                values,
                indices: perm.source_indices(),
            });
        }

        if s0.len() != perm.len() || !s0.indices_in_range() {
            warn!(path, set, uvs = s0.len(), corners = perm.len(), "Ignore UVs: corner count mismatch");
            return None;
        }
        let indices = match &s0.indices {
            Some(idx) => perm.apply(idx)?,
            None => perm.source_indices(),
        };
        Some(UvBuffer {
            values: s0.values,
            indices,
        })
    }

    fn add_tangents(&self, geometry: &mut GeometryRecord, set: &str, positions: &[Vec3]) {
        let t_name = format!("T{set}");
        let b_name = format!("B{set}");
        let has_t = geometry.attributes.contains(AttributeCategory::Point, &t_name);
        let has_b = geometry.attributes.contains(AttributeCategory::Point, &b_name);
        if has_t && has_b {
            warn!(path = %geometry.path, set, "Skip tangents generation: attributes exist");
            return;
        }
        let Some(uv) = geometry.uv_sets.get(set) else {
            return;
        };

        let normals = per_point_normals(geometry)
            .unwrap_or_else(|| {
                smooth_normals(positions, &geometry.face_counts, &geometry.vertex_indices, self.settings.reverse_winding)
            });
        let frame = compute_tangents(
            positions,
            &geometry.face_counts,
            &geometry.vertex_indices,
            &uv.values,
            &uv.indices,
            &normals,
        );

        for (name, exists, vectors) in [(t_name, has_t, frame.tangents), (b_name, has_b, frame.bitangents)] {
            if exists {
                warn!(path = %geometry.path, name = %name, "Point attribute already exists");
                continue;
            }
            geometry.attributes.push(AttributeRecord {
                name,
                element_type: ElementType::Vector3,
                category: AttributeCategory::Point,
                count: vectors.len(),
                values: AttributeValues::Float(bytemuck::cast_slice(&vectors).to_vec()),
                indices: None,
            });
        }
    }
}

/// Normals usable as per-point normals (one key, corner indices equal to
/// point indices).
fn per_point_normals(geometry: &GeometryRecord) -> Option<Vec<Vec3>> {
    let n = geometry.normals.as_ref()?;
    if n.motion_keys != 1 || n.values.len() != geometry.point_count || n.indices != geometry.vertex_indices {
        return None;
    }
    Some(n.values.iter().map(|v| v.normalize_or_zero()).collect())
}

/// Vec3 elements of point attribute `name` if it has `count` of them.
fn point_vectors(points: &[AttributeRecord], name: &str, count: usize) -> Option<Vec<Vec3>> {
    let record = points.iter().find(|r| r.name == name)?;
    if record.element_type != ElementType::Vector3 || record.count != count {
        return None;
    }
    let flat = record.as_f32()?;
    let elements: Vec<Vec3> = flat.chunks_exact(3).map(Vec3::from_slice).collect();
    match &record.indices {
        Some(idx) => idx.iter().map(|&i| elements.get(i as usize).copied()).collect(),
        None => Some(elements),
    }
}

/// Float pairs of a UV-like attribute sample.
fn uv_from_attribute(sample: &AttributeSample) -> Option<IndexedSample<Vec2>> {
    let flat: Vec<f32> = match &sample.values {
        AttributeValues::Float(v) => v.clone(),
        AttributeValues::Double(v) => v.iter().map(|&x| x as f32).collect(),
        _ => return None,
    };
    if flat.len() % 2 != 0 {
        return None;
    }
    let values = flat.chunks_exact(2).map(Vec2::from_slice).collect();
    Some(IndexedSample {
        values,
        indices: sample.indices.clone(),
    })
}

/// Drop records whose element count does not match the bucket's domain.
fn retain_counts(bucket: &mut Vec<AttributeRecord>, expected: usize, path: &str) {
    bucket.retain(|r| {
        let ok = r.count == expected;
        if !ok {
            warn!(path, name = %r.name, count = r.count, expected, "Skip attribute: element count mismatch");
        }
        ok
    });
}
