//! Scene visitors: shape collection, shape counting and time range.
//!
//! [`ShapeCollector`] resolves visibility and world matrix stacks (one
//! matrix per motion sample time) and records every shape it reaches.

use glam::DMat4;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use super::{traverse, NodeId, NodeKind, SceneGraph, VisitContext, VisitReturn, Visitor};
use crate::core::{SampleSource, TimeSampleSeries, TimeSampling};
use crate::geom::{is_visible, XformSchema};
use crate::util::{BBox3d, Chrono, Error, Lerp, Result};

/// Per-request traversal parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct TraversalOptions {
    pub render_time: Chrono,
    /// Motion sample times (seconds). Empty means `[render_time]`.
    pub motion_times: SmallVec<[Chrono; 4]>,
    pub ignore_visibility: bool,
    pub ignore_transforms: bool,
    pub ignore_transform_blur: bool,
    pub ignore_instances: bool,
    pub ignore_nurbs: bool,
    /// Prepended to output shape names.
    pub name_prefix: String,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self::at(0.0)
    }
}

impl TraversalOptions {
    /// Single-sample options at `render_time`.
    pub fn at(render_time: Chrono) -> Self {
        Self {
            render_time,
            motion_times: smallvec![render_time],
            ignore_visibility: false,
            ignore_transforms: false,
            ignore_transform_blur: false,
            ignore_instances: false,
            ignore_nurbs: false,
            name_prefix: String::new(),
        }
    }

    /// Motion sample times, never empty.
    pub fn sample_times(&self) -> SmallVec<[Chrono; 4]> {
        if self.motion_times.is_empty() {
            smallvec![self.render_time]
        } else {
            self.motion_times.clone()
        }
    }

    /// Times at which transforms are evaluated.
    pub fn transform_times(&self) -> SmallVec<[Chrono; 4]> {
        if self.ignore_transform_blur {
            smallvec![self.render_time]
        } else {
            self.sample_times()
        }
    }
}

/// Kind of a collected shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Mesh,
    SubdivisionMesh,
    PointCloud,
    Curves,
    NurbsPatch,
}

impl ShapeKind {
    fn of(kind: &NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Mesh(_) => Some(Self::Mesh),
            NodeKind::SubdivisionMesh(_) => Some(Self::SubdivisionMesh),
            NodeKind::PointCloud(_) => Some(Self::PointCloud),
            NodeKind::Curves(_) => Some(Self::Curves),
            NodeKind::NurbsPatch(_) => Some(Self::NurbsPatch),
            NodeKind::Transform { .. } | NodeKind::Instance { .. } => None,
        }
    }

    /// True for kinds the mesh assembler can build.
    pub fn is_mesh(self) -> bool {
        matches!(self, Self::Mesh | Self::SubdivisionMesh)
    }
}

/// A shape reached by the traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeEntry {
    /// Output name: name prefix plus output path.
    pub name: String,
    /// Output path (under the instance path when instanced).
    pub path: String,
    /// Node holding the geometry.
    pub node: NodeId,
    /// Path of the geometry node; the key shared by all its instances.
    pub geometry_path: String,
    /// Innermost instance the shape was reached through.
    pub instance: Option<NodeId>,
    pub kind: ShapeKind,
    /// World matrices, one per transform sample time (or one if static).
    pub world_matrices: Vec<DMat4>,
    /// World bounds over all motion samples.
    pub bounds: BBox3d,
}

impl ShapeEntry {
    pub fn is_instanced(&self) -> bool {
        self.instance.is_some()
    }

    /// World matrix for motion sample `i` (static stacks broadcast).
    pub fn world_matrix(&self, i: usize) -> DMat4 {
        self.world_matrices
            .get(i)
            .or(self.world_matrices.first())
            .copied()
            .unwrap_or(DMat4::IDENTITY)
    }
}

/// World matrix stack of a transform node.
///
/// - No local sample: the parent stack (identity at the root).
/// - One local sample: broadcast against every parent matrix.
/// - Several: each time is bracketed and the local matrices blended.
///   When the inherits flags of the two bracketing samples differ, the
///   earlier sample is used as is.
///
/// A non-inheriting sample drops the parent contribution.
pub fn world_matrix_stack(
    parent: Option<&[DMat4]>,
    xform: &XformSchema,
    times: &[Chrono],
    path: &str,
) -> Result<Vec<DMat4>> {
    let compose = |i: usize, local: DMat4, inherits: bool| match parent {
        Some(p) if inherits => p.get(i).or(p.first()).map_or(local, |pm| *pm * local),
        _ => local,
    };

    match xform.num_samples() {
        0 => Ok(parent.map_or_else(|| vec![DMat4::IDENTITY], <[DMat4]>::to_vec)),
        1 => {
            let sample = xform.samples.read_sample(0)?;
            let local = sample.matrix()?;
            match parent {
                Some(p) if sample.inherits => Ok(p.iter().map(|pm| *pm * local).collect()),
                _ => Ok(vec![local]),
            }
        }
        _ => {
            let mut series = TimeSampleSeries::new();
            for &t in times {
                series.update(&xform.samples, t, t, true)?;
            }
            times
                .iter()
                .enumerate()
                .map(|(i, &t)| -> Result<DMat4> {
                    let b = series
                        .get_samples(t)
                        .ok_or_else(|| Error::invalid(format!("{path}: no transform sample")))?;
                    let s0 = &b.sample0.data;
                    let s1 = &b.sample1.data;
                    let local = if b.is_exact() {
                        s0.matrix()?
                    } else if s0.inherits != s1.inherits {
                        warn!(path, time = t, "Animated inherits transform flag, use earlier sample");
                        s0.matrix()?
                    } else {
                        s0.matrix()?.interp(&s1.matrix()?, b.blend)
                    };
                    Ok(compose(i, local, s0.inherits))
                })
                .collect()
        }
    }
}

/// Blend of the per-sample bounds at `t`.
fn bounds_at(
    ts: &TimeSampling,
    num_samples: usize,
    t: Chrono,
    bounds_of: impl Fn(usize) -> Option<BBox3d>,
) -> Option<BBox3d> {
    let range = ts.window_indices(t, t, num_samples, true)?;
    let mut series = TimeSampleSeries::new();
    for i in range {
        if let Some(b) = bounds_of(i) {
            series.insert(ts.sample_time(i), i, b);
        }
    }
    series.value_at(t)
}

/// Local (object space) bounds of a shape node at `t`.
pub fn shape_bounds_at(kind: &NodeKind, t: Chrono) -> Option<BBox3d> {
    match kind {
        NodeKind::Mesh(m) | NodeKind::SubdivisionMesh(m) => bounds_at(
            &m.samples.time_sampling,
            m.samples.samples.len(),
            t,
            |i| m.samples.samples.get(i).map(|s| s.bounds()),
        ),
        NodeKind::PointCloud(b) | NodeKind::Curves(b) | NodeKind::NurbsPatch(b) => bounds_at(
            &b.self_bounds.time_sampling,
            b.self_bounds.samples.len(),
            t,
            |i| b.self_bounds.samples.get(i).copied(),
        ),
        NodeKind::Transform { .. } | NodeKind::Instance { .. } => None,
    }
}

/// Collects shapes with their world matrices and bounds.
#[derive(Debug)]
pub struct ShapeCollector<'o> {
    options: &'o TraversalOptions,
    transform_times: SmallVec<[Chrono; 4]>,
    stacks: Vec<Vec<DMat4>>,
    shapes: Vec<ShapeEntry>,
}

impl<'o> ShapeCollector<'o> {
    pub fn new(options: &'o TraversalOptions) -> Self {
        Self {
            options,
            transform_times: options.transform_times(),
            stacks: Vec::new(),
            shapes: Vec::new(),
        }
    }

    pub fn shapes(&self) -> &[ShapeEntry] {
        &self.shapes
    }

    pub fn into_shapes(self) -> Vec<ShapeEntry> {
        self.shapes
    }

    fn parent_stack(&self) -> Vec<DMat4> {
        self.stacks.last().cloned().unwrap_or_else(|| vec![DMat4::IDENTITY])
    }

    fn record(&mut self, graph: &SceneGraph, id: NodeId, kind: ShapeKind, ctx: &VisitContext) {
        let node = graph.node(id);
        let world_matrices = self.parent_stack();

        let mut bounds = BBox3d::EMPTY;
        for (i, &t) in self.options.sample_times().iter().enumerate() {
            if let Some(local) = shape_bounds_at(&node.kind, t) {
                let world = world_matrices.get(i).or(world_matrices.first()).copied().unwrap_or(DMat4::IDENTITY);
                bounds.expand_by_box(&local.transformed(&world));
            }
        }

        debug!(path = %ctx.path, kind = ?kind, instanced = ctx.is_instanced(), "Collect shape");
        self.shapes.push(ShapeEntry {
            name: format!("{}{}", self.options.name_prefix, ctx.path),
            path: ctx.path.clone(),
            node: id,
            geometry_path: node.path.clone(),
            instance: ctx.instance,
            kind,
            world_matrices,
            bounds,
        });
    }
}

impl Visitor for ShapeCollector<'_> {
    fn enter(&mut self, graph: &SceneGraph, id: NodeId, ctx: &VisitContext) -> VisitReturn {
        let node = graph.node(id);
        let parent = self.parent_stack();

        if !self.options.ignore_visibility && !is_visible(&node.properties, self.options.render_time) {
            debug!(path = %ctx.path, "Hidden, prune subtree");
            self.stacks.push(parent);
            return VisitReturn::DontVisitChildren;
        }

        match &node.kind {
            NodeKind::Transform { xform, .. } => {
                let stack = if self.options.ignore_transforms {
                    parent
                } else {
                    let parent_ref = if self.stacks.is_empty() { None } else { Some(parent.as_slice()) };
                    match world_matrix_stack(parent_ref, xform, &self.transform_times, &ctx.path) {
                        Ok(stack) => stack,
                        Err(e) => {
                            warn!(path = %ctx.path, error = %e, "Ignore transform");
                            parent
                        }
                    }
                };
                self.stacks.push(stack);
                VisitReturn::Continue
            }
            NodeKind::NurbsPatch(_) if self.options.ignore_nurbs => {
                self.stacks.push(parent);
                VisitReturn::DontVisitChildren
            }
            kind => {
                self.stacks.push(parent);
                if let Some(shape) = ShapeKind::of(kind) {
                    self.record(graph, id, shape, ctx);
                }
                VisitReturn::Continue
            }
        }
    }

    fn leave(&mut self, _graph: &SceneGraph, _node: NodeId, _ctx: &VisitContext) {
        self.stacks.pop();
    }

    fn enter_instance(&mut self, graph: &SceneGraph, instance: NodeId, ctx: &VisitContext) -> VisitReturn {
        if self.options.ignore_instances {
            return VisitReturn::DontVisitChildren;
        }
        let node = graph.node(instance);
        if !self.options.ignore_visibility && !is_visible(&node.properties, self.options.render_time) {
            debug!(path = %ctx.path, "Hidden instance");
            return VisitReturn::DontVisitChildren;
        }
        VisitReturn::Continue
    }
}

/// Collect every visible shape of `graph`.
pub fn collect_shapes(graph: &SceneGraph, options: &TraversalOptions) -> Vec<ShapeEntry> {
    let mut collector = ShapeCollector::new(options);
    traverse(graph, &mut collector);
    collector.into_shapes()
}

/// Counts mesh and subdivision shapes under the visibility and instance rules.
#[derive(Debug)]
pub struct ShapeCounter<'o> {
    options: &'o TraversalOptions,
    pub count: usize,
}

impl<'o> ShapeCounter<'o> {
    pub fn new(options: &'o TraversalOptions) -> Self {
        Self { options, count: 0 }
    }

    fn hidden(&self, graph: &SceneGraph, id: NodeId) -> bool {
        !self.options.ignore_visibility
            && !is_visible(&graph.node(id).properties, self.options.render_time)
    }
}

impl Visitor for ShapeCounter<'_> {
    fn enter(&mut self, graph: &SceneGraph, id: NodeId, _ctx: &VisitContext) -> VisitReturn {
        if self.hidden(graph, id) {
            return VisitReturn::DontVisitChildren;
        }
        match &graph.node(id).kind {
            NodeKind::Mesh(_) | NodeKind::SubdivisionMesh(_) => self.count += 1,
            NodeKind::NurbsPatch(_) if self.options.ignore_nurbs => return VisitReturn::DontVisitChildren,
            _ => {}
        }
        VisitReturn::Continue
    }

    fn enter_instance(&mut self, graph: &SceneGraph, instance: NodeId, _ctx: &VisitContext) -> VisitReturn {
        if self.options.ignore_instances || self.hidden(graph, instance) {
            VisitReturn::DontVisitChildren
        } else {
            VisitReturn::Continue
        }
    }
}

pub fn count_shapes(graph: &SceneGraph, options: &TraversalOptions) -> usize {
    let mut counter = ShapeCounter::new(options);
    traverse(graph, &mut counter);
    counter.count
}

/// Union of the sample ranges of animated transforms and meshes.
#[derive(Debug, Default)]
pub struct TimeRangeVisitor {
    pub range: Option<(Chrono, Chrono)>,
}

impl TimeRangeVisitor {
    fn add(&mut self, range: Option<(Chrono, Chrono)>) {
        if let Some((a, b)) = range {
            self.range = Some(match self.range {
                Some((lo, hi)) => (lo.min(a), hi.max(b)),
                None => (a, b),
            });
        }
    }
}

impl Visitor for TimeRangeVisitor {
    fn enter(&mut self, graph: &SceneGraph, id: NodeId, _ctx: &VisitContext) -> VisitReturn {
        match &graph.node(id).kind {
            NodeKind::Transform { xform, .. } => self.add(xform.samples.time_range()),
            NodeKind::Mesh(m) | NodeKind::SubdivisionMesh(m) => self.add(m.samples.time_range()),
            _ => {}
        }
        VisitReturn::Continue
    }

    // Masters are visited at their own location.
    fn enter_instance(&mut self, _: &SceneGraph, _: NodeId, _: &VisitContext) -> VisitReturn {
        VisitReturn::DontVisitChildren
    }
}

/// Animated time range of the scene, if anything is animated.
pub fn time_range(graph: &SceneGraph) -> Option<(Chrono, Chrono)> {
    let mut v = TimeRangeVisitor::default();
    traverse(graph, &mut v);
    v.range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Property;
    use crate::geom::{visibility_property, MeshSchema, PolyMeshSample, XformSample};
    use crate::scene::SceneBuilder;
    use glam::{DVec3, Vec3};

    fn tri() -> MeshSchema {
        MeshSchema::constant(PolyMeshSample::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![3],
            vec![0, 1, 2],
        ))
    }

    fn translate(x: f64, inherits: bool) -> XformSample {
        XformSample::from_matrix(DMat4::from_translation(DVec3::new(x, 0.0, 0.0)), inherits)
    }

    fn tx(m: &DMat4) -> f64 {
        m.w_axis.x
    }

    #[test]
    fn test_static_stack_broadcast() {
        let parent = [DMat4::IDENTITY, DMat4::from_translation(DVec3::X)];
        let xf = XformSchema::constant(translate(2.0, true));
        let stack = world_matrix_stack(Some(&parent[..]), &xf, &[0.0, 1.0], "/x").unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(tx(&stack[0]), 2.0);
        assert_eq!(tx(&stack[1]), 3.0);

        let root = world_matrix_stack(None, &xf, &[0.0, 1.0], "/x").unwrap();
        assert_eq!(root.len(), 1);

        let no_inherit = XformSchema::constant(translate(2.0, false));
        let stack = world_matrix_stack(Some(&parent[..]), &no_inherit, &[0.0, 1.0], "/x").unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(tx(&stack[0]), 2.0);

        let empty = world_matrix_stack(Some(&parent[..]), &XformSchema::default(), &[0.0], "/x").unwrap();
        assert_eq!(empty, parent.to_vec());
    }

    #[test]
    fn test_animated_stack_blends() {
        let xf = XformSchema::animated(Property::sampled_at(
            vec![0.0, 1.0],
            vec![translate(0.0, true), translate(10.0, true)],
        ));
        let stack = world_matrix_stack(Some(&[DMat4::IDENTITY][..]), &xf, &[0.0, 0.25, 2.0], "/x").unwrap();
        assert_eq!(stack.iter().map(tx).collect::<Vec<_>>(), vec![0.0, 2.5, 10.0]);
    }

    #[test]
    fn test_animated_inherits_uses_earlier_sample() {
        let parent = [DMat4::from_translation(DVec3::new(100.0, 0.0, 0.0))];
        let xf = XformSchema::animated(Property::sampled_at(
            vec![0.0, 1.0],
            vec![translate(1.0, false), translate(5.0, true)],
        ));
        let stack = world_matrix_stack(Some(&parent[..]), &xf, &[0.5], "/x").unwrap();
        assert_eq!(tx(&stack[0]), 1.0);
    }

    #[test]
    fn test_collect_with_hidden_subtree() {
        let mut b = SceneBuilder::new();
        b.transform("/", "hidden", XformSchema::constant(translate(1.0, true))).unwrap();
        b.mesh("/hidden", "shape", tri()).unwrap();
        b.property("/hidden", visibility_property(false)).unwrap();
        b.transform("/", "shown", XformSchema::constant(translate(3.0, true))).unwrap();
        b.mesh("/shown", "shape", tri()).unwrap();
        b.property("/shown/shape", visibility_property(true)).unwrap();
        let g = b.build().unwrap();

        let shapes = collect_shapes(&g, &TraversalOptions::at(0.0));
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].path, "/shown/shape");
        assert_eq!(tx(&shapes[0].world_matrices[0]), 3.0);
        assert_eq!(shapes[0].bounds.min.x, 3.0);

        let opts = TraversalOptions { ignore_visibility: true, ..TraversalOptions::at(0.0) };
        assert_eq!(count_shapes(&g, &opts), 2);
    }

    #[test]
    fn test_instances_and_prefix() {
        let mut b = SceneBuilder::new();
        b.transform("/", "master", XformSchema::default()).unwrap();
        b.mesh("/master", "geo", tri()).unwrap();
        b.transform("/", "placed", XformSchema::constant(translate(5.0, true))).unwrap();
        b.instance("/placed", "copy", "/master").unwrap();
        let g = b.build().unwrap();

        let opts = TraversalOptions { name_prefix: "ns:".into(), ..TraversalOptions::at(0.0) };
        let shapes = collect_shapes(&g, &opts);
        assert_eq!(shapes.len(), 2);
        let inst = &shapes[1];
        assert_eq!(inst.path, "/placed/copy/geo");
        assert_eq!(inst.name, "ns:/placed/copy/geo");
        assert_eq!(inst.geometry_path, "/master/geo");
        assert!(inst.is_instanced());
        assert_eq!(tx(&inst.world_matrix(0)), 5.0);

        let opts = TraversalOptions { ignore_instances: true, ..TraversalOptions::at(0.0) };
        assert_eq!(collect_shapes(&g, &opts).len(), 1);
        assert_eq!(count_shapes(&g, &opts), 1);
    }

    #[test]
    fn test_time_range() {
        let mut b = SceneBuilder::new();
        b.transform(
            "/",
            "anim",
            XformSchema::animated(Property::sampled_at(
                vec![1.0, 2.0],
                vec![translate(0.0, true), translate(1.0, true)],
            )),
        )
        .unwrap();
        b.mesh(
            "/anim",
            "geo",
            MeshSchema::new(Property::sampled_at(
                vec![0.5, 1.5],
                vec![tri().samples.samples[0].clone(), tri().samples.samples[0].clone()],
            )),
        )
        .unwrap();
        let g = b.build().unwrap();
        assert_eq!(time_range(&g), Some((0.5, 2.0)));

        let still = SceneBuilder::new().build().unwrap();
        assert_eq!(time_range(&still), None);
    }
}
