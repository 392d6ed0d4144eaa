//! Scene layer - object hierarchy, archive access and traversal.
//!
//! - [`SceneGraph`] / [`SceneBuilder`] - Arena of nodes addressed by path
//! - [`ArchiveOpener`] - Path to validated graph ([`JsonArchiveOpener`], [`MemoryOpener`])
//! - [`SceneHandleCache`] - Reference-counted sharing of opened scenes
//! - [`traverse`] / [`Visitor`] - Depth-first walk with instance redirection
//! - [`ShapeCollector`] - World matrices, bounds and visibility of shapes

mod archive;
mod cache;
mod filter;
mod node;
mod traversal;
mod visitors;

pub use archive::{ArchiveOpener, JsonArchiveOpener, MemoryOpener};
pub use cache::{SceneHandle, SceneHandleCache, SceneKey};
pub use filter::{wildcard_match, SceneFilter};
pub use node::{NodeDesc, NodeId, NodeKind, SceneBuilder, SceneGraph, SceneNode, ROOT_PATH};
pub use traversal::{traverse, traverse_from, VisitContext, VisitReturn, Visitor};
pub use visitors::{
    collect_shapes, count_shapes, shape_bounds_at, time_range, world_matrix_stack, ShapeCollector,
    ShapeCounter, ShapeEntry, ShapeKind, TimeRangeVisitor, TraversalOptions,
};
