//! # Alembic Expand
//!
//! On-demand expansion of hierarchical, time-sampled Alembic-style scene
//! caches into flat, renderer-ready geometry buffers.
//!
//! ## Modules
//!
//! - [`util`] - Errors, bounds and interpolation
//! - [`core`] - Time sampling, sampled properties and sample series
//! - [`geom`] - Schema payloads (xform, polymesh, visibility, attributes)
//! - [`scene`] - Node graph, filters, archive openers, handle cache, traversal
//! - [`expand`] - Settings, winding, mesh assembly, tangents, master cache
//!
//! ## Example
//!
//! ```ignore
//! use alembic_expand::prelude::*;
//!
//! let cache = SceneHandleCache::new(JsonArchiveOpener);
//! let settings = ExpandSettings::load("expand.json")?;
//! let expander = Expander::open(&cache, "shot.json", &SceneFilter::default(), settings)?;
//!
//! for shape in expander.expand_all() {
//!     if let Some(mesh) = shape.geometry.mesh() {
//!         println!("{}: {} faces", shape.entry.name, mesh.num_faces());
//!     }
//! }
//! ```

pub mod util;
pub mod core;
pub mod geom;
pub mod scene;
pub mod expand;

// Re-export commonly used types
pub use util::{Error, Result};
pub use expand::{ExpandSettings, Expander, GeometryRecord};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{BBox3d, Chrono, Error, Result};
    pub use crate::core::{GeometryScope, Property, TimeSampling, TopologyVariance};
    pub use crate::geom::*;
    pub use crate::scene::{
        JsonArchiveOpener, MemoryOpener, NodeKind, SceneBuilder, SceneFilter, SceneGraph,
        SceneHandleCache, ShapeEntry,
    };
    pub use crate::expand::{
        ExpandRequest, ExpandSettings, ExpandedShape, Expander, GeometryRecord, ShapeGeometry,
        TimeSettings,
    };
}
