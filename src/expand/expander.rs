//! Scene expansion entry point.
//!
//! An [`Expander`] binds a scene, settings and one time request. It
//! collects shapes with the scene traversal, assembles each mesh, and with
//! instancing on shares one [`GeometryRecord`] between every shape that
//! points at the same geometry node.
//!
//! Expanders opened through a [`SceneHandleCache`] share the master table
//! stored with the cached scene, so a master built for one request is
//! reused by every later request with the same sample times and geometry
//! settings.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use super::master::{Acquired, MasterBuildCache};
use super::{ExpandRequest, ExpandSettings, GeometryRecord, MeshAssembler};
use crate::scene::{
    collect_shapes, count_shapes, time_range, NodeKind, SceneFilter, SceneGraph, SceneHandle,
    SceneHandleCache, ShapeEntry,
};
use crate::util::{Chrono, Error, Result};

/// Geometry outcome of one shape.
#[derive(Clone, Debug)]
pub enum ShapeGeometry {
    Mesh(Arc<GeometryRecord>),
    /// Nothing to render: structural failure or a non-mesh shape.
    NoGeometry { reason: String },
}

impl ShapeGeometry {
    pub fn mesh(&self) -> Option<&Arc<GeometryRecord>> {
        match self {
            Self::Mesh(g) => Some(g),
            Self::NoGeometry { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoGeometry { .. })
    }
}

/// One collected shape and its geometry.
#[derive(Clone, Debug)]
pub struct ExpandedShape {
    pub entry: ShapeEntry,
    pub geometry: ShapeGeometry,
    /// Geometry was built by another shape sharing the same master.
    pub shared: bool,
}

/// Master table shared by the expanders of one scene.
pub type MasterTable = MasterBuildCache<GeometryRecord>;

/// Collected shapes, in traversal order, indexed by output path.
struct ShapeIndex {
    entries: Vec<ShapeEntry>,
    by_path: HashMap<String, usize>,
}

/// Expands the shapes of one scene for one request.
pub struct Expander {
    scene: Arc<SceneGraph>,
    // Keeps the cache entry alive while expanding.
    _handle: Option<SceneHandle>,
    settings: ExpandSettings,
    request: ExpandRequest,
    masters: Arc<MasterTable>,
    // Appended to geometry paths to form master keys.
    key_suffix: String,
    shapes: OnceLock<ShapeIndex>,
}

impl Expander {
    /// Expander with a private master table.
    pub fn new(scene: Arc<SceneGraph>, settings: ExpandSettings, request: ExpandRequest) -> Self {
        Self::with_masters(scene, settings, request, Arc::new(MasterTable::new()))
    }

    /// Expander building into (and reusing from) `masters`.
    pub fn with_masters(
        scene: Arc<SceneGraph>,
        settings: ExpandSettings,
        request: ExpandRequest,
        masters: Arc<MasterTable>,
    ) -> Self {
        let key_suffix = master_key_suffix(&settings, &request);
        Self {
            scene,
            _handle: None,
            settings,
            request,
            masters,
            key_suffix,
            shapes: OnceLock::new(),
        }
    }

    /// Expander with the request derived from `settings.time` and the
    /// scene's animated range.
    pub fn from_settings(scene: Arc<SceneGraph>, settings: ExpandSettings) -> Self {
        let request = settings.time.request(time_range(&scene));
        Self::new(scene, settings, request)
    }

    /// Acquire `path` through `cache` and bind an expander to it.
    pub fn open(
        cache: &SceneHandleCache,
        path: impl AsRef<Path>,
        filter: &SceneFilter,
        settings: ExpandSettings,
    ) -> Result<Self> {
        let handle = cache.acquire(path, filter)?;
        let request = settings.time.request(time_range(handle.scene()));
        let mut expander = Self::with_masters(
            Arc::clone(handle.scene()),
            settings,
            request,
            Arc::clone(handle.masters()),
        );
        if expander.settings.verbose {
            info!(
                key = %handle.key(),
                render_time = expander.request.render_time,
                motion_samples = expander.request.sample_times().len(),
                "Scene opened"
            );
        }
        expander._handle = Some(handle);
        Ok(expander)
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn settings(&self) -> &ExpandSettings {
        &self.settings
    }

    pub fn request(&self) -> &ExpandRequest {
        &self.request
    }

    /// Shared geometry built so far.
    pub fn masters(&self) -> &MasterTable {
        &self.masters
    }

    /// Key of the master built for `geometry_path` under this request.
    pub fn master_key(&self, geometry_path: &str) -> String {
        format!("{geometry_path}{}", self.key_suffix)
    }

    /// Shapes in traversal order. Collected on first use.
    pub fn shapes(&self) -> &[ShapeEntry] {
        &self.shape_index().entries
    }

    /// Collected shape with output path `path`.
    pub fn shape(&self, path: &str) -> Option<&ShapeEntry> {
        let index = self.shape_index();
        index.by_path.get(path).map(|&i| &index.entries[i])
    }

    pub fn collect_shapes(&self) -> Vec<ShapeEntry> {
        self.shapes().to_vec()
    }

    pub fn count_shapes(&self) -> usize {
        count_shapes(&self.scene, &self.settings.traversal_options(&self.request))
    }

    pub fn time_range(&self) -> Option<(Chrono, Chrono)> {
        time_range(&self.scene)
    }

    /// Expand the shape whose output path is `path`.
    pub fn expand_path(&self, path: &str) -> Result<ExpandedShape> {
        let entry = self
            .shape(path)
            .ok_or_else(|| Error::ObjectNotFound(path.to_string()))?;
        Ok(self.expand_shape(entry))
    }

    /// Expand every visible shape in parallel, in traversal order.
    #[instrument(skip_all, fields(render_time = self.request.render_time))]
    pub fn expand_all(&self) -> Vec<ExpandedShape> {
        let shapes = self.shapes();
        debug!(shapes = shapes.len(), "Expanding shapes");
        let out: Vec<ExpandedShape> = shapes.par_iter().map(|e| self.expand_shape(e)).collect();
        if self.settings.verbose {
            let meshes = out.iter().filter(|s| !s.geometry.is_empty()).count();
            info!(
                shapes = out.len(),
                meshes,
                masters = self.masters.build_count(),
                "Expansion finished"
            );
        }
        out
    }

    /// Expand one collected shape. Failures become `NoGeometry`.
    #[instrument(skip_all, fields(path = %entry.path))]
    pub fn expand_shape(&self, entry: &ShapeEntry) -> ExpandedShape {
        let (geometry, shared) = match self.geometry(entry) {
            Ok((g, shared)) => (ShapeGeometry::Mesh(g), shared),
            Err(e) => {
                if entry.kind.is_mesh() {
                    warn!(error = %e, "No geometry");
                } else {
                    debug!(error = %e, "No geometry");
                }
                (ShapeGeometry::NoGeometry { reason: e.to_string() }, false)
            }
        };
        ExpandedShape {
            entry: entry.clone(),
            geometry,
            shared,
        }
    }

    fn geometry(&self, entry: &ShapeEntry) -> Result<(Arc<GeometryRecord>, bool)> {
        if !entry.kind.is_mesh() || !self.settings.instancing {
            return self.build(entry).map(|g| (Arc::new(g), false));
        }
        match self.masters.acquire(&self.master_key(&entry.geometry_path))? {
            Acquired::Ready(g) => Ok((g, true)),
            Acquired::Build(ticket) => ticket.finish(self.build(entry)).map(|g| (g, false)),
        }
    }

    fn shape_index(&self) -> &ShapeIndex {
        self.shapes.get_or_init(|| {
            let entries = collect_shapes(&self.scene, &self.settings.traversal_options(&self.request));
            let by_path = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.path.clone(), i))
                .collect();
            debug!(shapes = entries.len(), "Shapes collected");
            ShapeIndex { entries, by_path }
        })
    }

    fn build(&self, entry: &ShapeEntry) -> Result<GeometryRecord> {
        let node = self.scene.node(entry.node);
        let assembler = MeshAssembler::new(&self.settings, &self.request);
        match &node.kind {
            NodeKind::Mesh(mesh) => assembler.assemble(&entry.geometry_path, mesh, false),
            NodeKind::SubdivisionMesh(mesh) => assembler.assemble(&entry.geometry_path, mesh, true),
            other => Err(Error::no_geometry(
                &entry.geometry_path,
                format!("{} shapes produce no geometry", other.type_name()),
            )),
        }
    }
}

/// Request times plus a digest of the settings that shape geometry.
///
/// Time conversion, naming and logging settings are left out; they never
/// change an assembled record once the request is fixed.
fn master_key_suffix(settings: &ExpandSettings, request: &ExpandRequest) -> String {
    let geometry = ExpandSettings {
        time: Default::default(),
        name_prefix: String::new(),
        verbose: false,
        ..settings.clone()
    };
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&geometry).unwrap_or_default().hash(&mut hasher);
    format!(
        "@{:?}{:?}#{:016x}",
        request.render_time,
        request.sample_times().as_slice(),
        hasher.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{BoundedSchema, MeshSchema, PolyMeshSample, XformSchema};
    use crate::scene::SceneBuilder;
    use glam::Vec3;

    fn tri() -> MeshSchema {
        MeshSchema::constant(PolyMeshSample::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![3],
            vec![0, 1, 2],
        ))
    }

    fn scene() -> Arc<SceneGraph> {
        let mut b = SceneBuilder::new();
        b.transform("/", "geo", XformSchema::default()).unwrap();
        b.mesh("/geo", "tri", tri()).unwrap();
        b.add("/geo", "pts", NodeKind::PointCloud(BoundedSchema::default())).unwrap();
        b.instance("/", "copy", "/geo").unwrap();
        b.mesh("/", "broken", MeshSchema::default()).unwrap();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_instances_share_geometry() {
        let ex = Expander::new(scene(), ExpandSettings::default(), ExpandRequest::at(0.0));
        let out = ex.expand_all();
        let meshes: Vec<_> = out.iter().filter_map(|s| s.geometry.mesh()).collect();
        assert_eq!(meshes.len(), 2);
        assert!(Arc::ptr_eq(meshes[0], meshes[1]));
        assert_eq!(out.iter().filter(|s| s.shared).count(), 1);
        assert_eq!(ex.masters().build_count(), 2);
    }

    #[test]
    fn test_without_instancing_builds_each() {
        let settings = ExpandSettings { instancing: false, ..Default::default() };
        let ex = Expander::new(scene(), settings, ExpandRequest::at(0.0));
        let out = ex.expand_all();
        let meshes: Vec<_> = out.iter().filter_map(|s| s.geometry.mesh()).collect();
        assert_eq!(meshes.len(), 2);
        assert!(!Arc::ptr_eq(meshes[0], meshes[1]));
        assert!(ex.masters().is_empty());
    }

    #[test]
    fn test_shared_table_across_requests() {
        let masters = Arc::new(MasterTable::new());
        let first = Expander::with_masters(
            scene(),
            ExpandSettings::default(),
            ExpandRequest::at(0.0),
            Arc::clone(&masters),
        );
        first.expand_all();
        assert_eq!(masters.build_count(), 2);

        // Same request, same settings: everything is reused.
        let again = Expander::with_masters(
            scene(),
            ExpandSettings { name_prefix: "x:".into(), ..Default::default() },
            ExpandRequest::at(0.0),
            Arc::clone(&masters),
        );
        assert_eq!(again.master_key("/geo/tri"), first.master_key("/geo/tri"));
        assert!(again.expand_all().iter().filter(|s| !s.geometry.is_empty()).all(|s| s.shared));
        assert_eq!(masters.build_count(), 2);

        // Other times or geometry settings get their own keys.
        let later = Expander::with_masters(
            scene(),
            ExpandSettings::default(),
            ExpandRequest::at(0.5),
            Arc::clone(&masters),
        );
        let flipped = Expander::with_masters(
            scene(),
            ExpandSettings { reverse_winding: false, ..Default::default() },
            ExpandRequest::at(0.0),
            Arc::clone(&masters),
        );
        assert_ne!(later.master_key("/geo/tri"), first.master_key("/geo/tri"));
        assert_ne!(flipped.master_key("/geo/tri"), first.master_key("/geo/tri"));
        let tri = flipped.expand_path("/geo/tri").unwrap();
        assert!(!tri.shared);
        assert_eq!(tri.geometry.mesh().unwrap().vertex_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_shapes_collected_once() {
        let ex = Expander::new(scene(), ExpandSettings::default(), ExpandRequest::at(0.0));
        let first = ex.shape("/copy/tri").unwrap();
        ex.expand_path("/geo/tri").unwrap();
        ex.expand_path("/copy/tri").unwrap();
        assert!(std::ptr::eq(first, ex.shape("/copy/tri").unwrap()));
        assert!(std::ptr::eq(ex.shapes().as_ptr(), ex.shapes().as_ptr()));
        assert_eq!(ex.shapes().len(), ex.collect_shapes().len());
        assert!(ex.shape("/nope").is_none());
    }

    #[test]
    fn test_non_mesh_and_broken_are_empty() {
        let ex = Expander::new(scene(), ExpandSettings::default(), ExpandRequest::at(0.0));
        assert!(ex.expand_path("/geo/pts").unwrap().geometry.is_empty());
        let broken = ex.expand_path("/broken").unwrap();
        assert!(matches!(broken.geometry, ShapeGeometry::NoGeometry { .. }));
        assert!(matches!(ex.expand_path("/nope"), Err(Error::ObjectNotFound(_))));
    }
}
