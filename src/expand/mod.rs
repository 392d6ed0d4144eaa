//! Shape expansion.
//!
//! - [`ExpandSettings`] / [`TimeSettings`] - Configuration and time conversion
//! - [`CornerPermutation`] - Winding reversal shared by every per-corner buffer
//! - [`MeshAssembler`] - Mesh schema to [`GeometryRecord`]
//! - [`MasterBuildCache`] - Build-once table for instanced geometry
//! - [`Expander`] - Traversal plus (parallel) assembly of a whole scene

mod expander;
mod master;
mod mesh;
mod settings;
mod tangents;
mod winding;

pub use expander::{ExpandedShape, Expander, MasterTable, ShapeGeometry};
pub use master::{Acquired, BuildTicket, MasterBuildCache, MasterBuildState};
pub use mesh::{GeometryRecord, MeshAssembler, NormalBuffer, UvBuffer};
pub use settings::{
    retime, AttributesEvaluationTime, CycleType, ExpandRequest, ExpandSettings, TimeSettings,
};
pub use tangents::{compute_tangents, fan_triangles, smooth_normals, TangentFrame, DEGENERATE_UV_EPS};
pub use winding::CornerPermutation;
