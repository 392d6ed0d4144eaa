//! Depth-first scene traversal.
//!
//! [`traverse`] walks a [`SceneGraph`] and calls a [`Visitor`] on entry and
//! exit of every node. Instance nodes are redirected: the walker looks up
//! the master by path and traverses it with a [`VisitContext`] naming the
//! instance, so visitors produce output under the instance's path.

use tracing::warn;

use super::{NodeId, SceneGraph, ROOT_PATH};

/// What the walker does after [`Visitor::enter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitReturn {
    Continue,
    /// Skip the node's children (its `leave` still runs).
    DontVisitChildren,
    /// Abort the whole traversal.
    Stop,
}

/// Where the walker currently is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitContext {
    /// Output path of the current node (instance path plus the path
    /// relative to the master when reached through an instance).
    pub path: String,
    /// Innermost instance the current node is reached through.
    pub instance: Option<NodeId>,
    /// Masters currently being traversed through instances.
    masters: Vec<NodeId>,
}

impl VisitContext {
    fn root() -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            instance: None,
            masters: Vec::new(),
        }
    }

    fn child(&self, name: &str) -> Self {
        let path = if self.path == ROOT_PATH {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        };
        Self {
            path,
            instance: self.instance,
            masters: self.masters.clone(),
        }
    }

    /// True when the node is reached through an instance.
    pub fn is_instanced(&self) -> bool {
        self.instance.is_some()
    }
}

/// Callbacks invoked by [`traverse`].
pub trait Visitor {
    /// Called before a node's children.
    fn enter(&mut self, graph: &SceneGraph, node: NodeId, ctx: &VisitContext) -> VisitReturn;

    /// Called after a node's children (also when they were skipped).
    fn leave(&mut self, _graph: &SceneGraph, _node: NodeId, _ctx: &VisitContext) {}

    /// Called on an instance node before redirecting into its master.
    /// Anything but `Continue` skips the master.
    fn enter_instance(&mut self, _graph: &SceneGraph, _instance: NodeId, _ctx: &VisitContext) -> VisitReturn {
        VisitReturn::Continue
    }
}

/// Walk the whole graph from the root.
pub fn traverse<V: Visitor + ?Sized>(graph: &SceneGraph, visitor: &mut V) -> VisitReturn {
    visit(graph, SceneGraph::ROOT, &VisitContext::root(), visitor)
}

/// Walk the subtree rooted at `node`.
pub fn traverse_from<V: Visitor + ?Sized>(graph: &SceneGraph, node: NodeId, visitor: &mut V) -> VisitReturn {
    let mut ctx = VisitContext::root();
    ctx.path = graph.node(node).path.clone();
    visit(graph, node, &ctx, visitor)
}

fn visit<V: Visitor + ?Sized>(graph: &SceneGraph, id: NodeId, ctx: &VisitContext, visitor: &mut V) -> VisitReturn {
    let node = graph.node(id);

    if node.is_instance() {
        match visitor.enter_instance(graph, id, ctx) {
            VisitReturn::Continue => {}
            VisitReturn::DontVisitChildren => return VisitReturn::Continue,
            VisitReturn::Stop => return VisitReturn::Stop,
        }
        let master = match graph.master_of(id) {
            Ok(master) => master,
            Err(e) => {
                warn!(path = %node.path, error = %e, "Skip instance");
                return VisitReturn::Continue;
            }
        };
        if ctx.masters.contains(&master) {
            warn!(path = %node.path, "Skip instance: cyclic instancing");
            return VisitReturn::Continue;
        }
        let mut inner = ctx.clone();
        inner.instance = Some(id);
        inner.masters.push(master);
        return visit(graph, master, &inner, visitor);
    }

    match visitor.enter(graph, id, ctx) {
        VisitReturn::Stop => return VisitReturn::Stop,
        VisitReturn::DontVisitChildren => {
            visitor.leave(graph, id, ctx);
            return VisitReturn::Continue;
        }
        VisitReturn::Continue => {}
    }

    for &child in graph.children(id) {
        let child_ctx = ctx.child(&graph.node(child).name);
        if visit(graph, child, &child_ctx, visitor) == VisitReturn::Stop {
            return VisitReturn::Stop;
        }
    }

    visitor.leave(graph, id, ctx);
    VisitReturn::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::XformSchema;
    use crate::scene::SceneBuilder;

    #[derive(Default)]
    struct Recorder {
        entered: Vec<String>,
        left: usize,
        prune: Option<String>,
        stop_at: Option<String>,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, _: &SceneGraph, _: NodeId, ctx: &VisitContext) -> VisitReturn {
            self.entered.push(ctx.path.clone());
            if self.stop_at.as_deref() == Some(ctx.path.as_str()) {
                VisitReturn::Stop
            } else if self.prune.as_deref() == Some(ctx.path.as_str()) {
                VisitReturn::DontVisitChildren
            } else {
                VisitReturn::Continue
            }
        }

        fn leave(&mut self, _: &SceneGraph, _: NodeId, _: &VisitContext) {
            self.left += 1;
        }
    }

    fn graph() -> SceneGraph {
        let mut b = SceneBuilder::new();
        b.transform("/", "a", XformSchema::default()).unwrap();
        b.transform("/a", "leaf", XformSchema::default()).unwrap();
        b.transform("/", "b", XformSchema::default()).unwrap();
        b.instance("/b", "copy", "/a").unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_depth_first_with_instance_paths() {
        let g = graph();
        let mut r = Recorder::default();
        assert_eq!(traverse(&g, &mut r), VisitReturn::Continue);
        assert_eq!(r.entered, vec!["/", "/a", "/a/leaf", "/b", "/b/copy", "/b/copy/leaf"]);
        assert_eq!(r.left, r.entered.len());
    }

    #[test]
    fn test_prune_and_stop() {
        let g = graph();
        let mut r = Recorder { prune: Some("/a".into()), ..Default::default() };
        traverse(&g, &mut r);
        assert!(!r.entered.contains(&"/a/leaf".to_string()));
        assert!(r.entered.contains(&"/b/copy/leaf".to_string()));

        let mut r = Recorder { stop_at: Some("/a/leaf".into()), ..Default::default() };
        assert_eq!(traverse(&g, &mut r), VisitReturn::Stop);
        assert_eq!(r.entered.last().map(String::as_str), Some("/a/leaf"));
    }
}
