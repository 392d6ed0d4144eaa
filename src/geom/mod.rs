//! Geometry schemas.
//!
//! In-memory schema payloads of scene nodes:
//! - [`XformSchema`] - Transform nodes
//! - [`MeshSchema`] - Polygon and subdivision meshes
//! - [`BoundedSchema`] - Points, curves and NURBS patches (bounds only)
//! - [`GeomParam`] / [`AttributeProperty`] - Typed and untyped geometry parameters
//! - [`AttributeClassifier`] - Scope to attribute-category mapping

pub mod bounded;
pub mod geom_param;
pub mod polymesh;
pub mod visibility;
pub mod xform;

pub use bounded::BoundedSchema;

pub use geom_param::{
    AttributeBuckets, AttributeCategory, AttributeClassifier, AttributeFilter, AttributeProperty,
    AttributeRecord, AttributeRoute, AttributeSample, AttributeValues, ClassifiedAttributes,
    ElementType, GeomParam, IndexedSample, DEFAULT_UV_SET, RESERVED_POINT_NAMES,
    RESERVED_UV_NAME, UV_INTERPRETATION,
};

pub use polymesh::{MeshSchema, PolyMeshSample};

pub use visibility::{
    get_visibility, is_visible, visibility_property, ObjectVisibility, VISIBILITY_PROPERTY_NAME,
};

pub use xform::{XformOp, XformOpType, XformSample, XformSchema};
