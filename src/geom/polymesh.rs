//! PolyMesh (polygon mesh) schema.
//!
//! The same schema backs subdivision meshes; only the node kind differs.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{AttributeProperty, GeomParam};
use crate::core::{Property, SampleSource, TopologyVariance};
use crate::util::BBox3d;

/// Polygon mesh sample data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolyMeshSample {
    /// Vertex positions (P).
    pub positions: Vec<Vec3>,
    /// Number of corners of each face.
    pub face_counts: Vec<i32>,
    /// Per-corner indices into `positions`.
    pub face_indices: Vec<i32>,
    /// Per-point velocities (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocities: Option<Vec<Vec3>>,
    /// Bounds stored with the sample (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_bounds: Option<BBox3d>,
}

impl PolyMeshSample {
    pub fn new(positions: Vec<Vec3>, face_counts: Vec<i32>, face_indices: Vec<i32>) -> Self {
        Self {
            positions,
            face_counts,
            face_indices,
            velocities: None,
            self_bounds: None,
        }
    }

    pub fn with_velocities(mut self, velocities: Vec<Vec3>) -> Self {
        self.velocities = Some(velocities);
        self
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_faces(&self) -> usize {
        self.face_counts.len()
    }

    pub fn num_indices(&self) -> usize {
        self.face_indices.len()
    }

    /// Check if this is a valid mesh (has positions and face data).
    pub fn is_valid(&self) -> bool {
        !self.positions.is_empty() && !self.face_counts.is_empty() && !self.face_indices.is_empty()
    }

    /// True if both samples share face connectivity.
    pub fn same_topology(&self, other: &Self) -> bool {
        self.face_counts == other.face_counts && self.face_indices == other.face_indices
    }

    /// Stored bounds, or bounds of the positions.
    pub fn bounds(&self) -> BBox3d {
        self.self_bounds
            .unwrap_or_else(|| BBox3d::from_points(&self.positions))
    }
}

/// Mesh node payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshSchema {
    pub samples: Property<PolyMeshSample>,
    /// Declared topology variance; inferred from the samples when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologyVariance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<GeomParam<Vec3>>,
    /// Default UV set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvs: Option<GeomParam<Vec2>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arb_geom_params: Vec<AttributeProperty>,
}

impl MeshSchema {
    pub fn new(samples: Property<PolyMeshSample>) -> Self {
        Self {
            samples,
            ..Default::default()
        }
    }

    pub fn constant(sample: PolyMeshSample) -> Self {
        Self::new(Property::constant(sample))
    }

    pub fn with_topology(mut self, topology: TopologyVariance) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn with_normals(mut self, normals: GeomParam<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: GeomParam<Vec2>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_param(mut self, param: AttributeProperty) -> Self {
        self.arb_geom_params.push(param);
        self
    }

    pub fn num_samples(&self) -> usize {
        self.samples.num_samples()
    }

    /// Declared variance, or inferred from the stored samples.
    pub fn topology_variance(&self) -> TopologyVariance {
        if let Some(t) = self.topology {
            return t;
        }
        let samples = &self.samples.samples;
        match samples.split_first() {
            None => TopologyVariance::Static,
            Some((_, [])) => TopologyVariance::Static,
            Some((first, rest)) if rest.iter().all(|s| s.same_topology(first)) => {
                TopologyVariance::Homogeneous
            }
            Some(_) => TopologyVariance::Heterogeneous,
        }
    }
}
