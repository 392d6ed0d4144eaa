//! Scene graph nodes.
//!
//! The graph is an arena of [`SceneNode`]s addressed by [`NodeId`]. Parents
//! are plain ids (non-owning), children are owned through the arena. Paths
//! are unique and absolute (`/group/shape`); the root is `/`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geom::{AttributeProperty, BoundedSchema, MeshSchema, XformSchema};
use crate::util::{Error, Result};

use super::SceneFilter;

/// Index of a node in its [`SceneGraph`].
pub type NodeId = usize;

/// Path of the root node.
pub const ROOT_PATH: &str = "/";

/// Node payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Transform {
        #[serde(default)]
        xform: XformSchema,
        /// Locator transforms carry no geometry of their own.
        #[serde(default)]
        locator: bool,
    },
    Mesh(MeshSchema),
    SubdivisionMesh(MeshSchema),
    PointCloud(BoundedSchema),
    Curves(BoundedSchema),
    NurbsPatch(BoundedSchema),
    /// Reference to another (non-instance) node's subtree.
    Instance { master_path: String },
}

impl NodeKind {
    pub fn transform(xform: XformSchema) -> Self {
        Self::Transform { xform, locator: false }
    }

    pub fn identity() -> Self {
        Self::transform(XformSchema::default())
    }

    /// True for nodes that produce a shape entry.
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            Self::Mesh(_) | Self::SubdivisionMesh(_) | Self::PointCloud(_) | Self::Curves(_) | Self::NurbsPatch(_)
        )
    }

    /// Mesh payload of polygon and subdivision meshes.
    pub fn mesh(&self) -> Option<&MeshSchema> {
        match self {
            Self::Mesh(m) | Self::SubdivisionMesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Transform { .. } => "transform",
            Self::Mesh(_) => "mesh",
            Self::SubdivisionMesh(_) => "subdivision_mesh",
            Self::PointCloud(_) => "point_cloud",
            Self::Curves(_) => "curves",
            Self::NurbsPatch(_) => "nurbs_patch",
            Self::Instance { .. } => "instance",
        }
    }
}

/// A node in the scene hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// User properties (including `visible`).
    pub properties: Vec<AttributeProperty>,
}

impl SceneNode {
    pub fn is_instance(&self) -> bool {
        matches!(self.kind, NodeKind::Instance { .. })
    }

    pub fn master_path(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Instance { master_path } => Some(master_path),
            _ => None,
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Arena-backed scene hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    by_path: HashMap<String, NodeId>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Id of the root node.
    pub const ROOT: NodeId = 0;

    /// Graph holding only an identity root transform.
    pub fn new() -> Self {
        let root = SceneNode {
            name: String::new(),
            path: ROOT_PATH.to_string(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::identity(),
            properties: Vec::new(),
        };
        Self {
            by_path: HashMap::from([(ROOT_PATH.to_string(), Self::ROOT)]),
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Node by id. Ids come from this graph, so this never fails for them.
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Look up a node by absolute path.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn find_node(&self, path: &str) -> Result<&SceneNode> {
        self.find(path)
            .map(|id| self.node(id))
            .ok_or_else(|| Error::ObjectNotFound(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id].parent, move |&p| self.nodes[p].parent)
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Depth-first (pre-order) list of the subtree rooted at `id`.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.nodes[n].children.iter().rev());
        }
        out
    }

    /// Append a child node.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(Error::invalid(format!("invalid node name '{name}'")));
        }
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| Error::ObjectNotFound(format!("node #{parent}")))?;
        if parent_node.is_instance() {
            return Err(Error::invalid(format!(
                "instance {} cannot have children",
                parent_node.path
            )));
        }
        let path = child_path(&parent_node.path, &name);
        if self.by_path.contains_key(&path) {
            return Err(Error::invalid(format!("duplicate path {path}")));
        }

        let id = self.nodes.len();
        self.nodes.push(SceneNode {
            name,
            path: path.clone(),
            parent: Some(parent),
            children: Vec::new(),
            kind,
            properties: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        self.by_path.insert(path, id);
        Ok(id)
    }

    pub fn add_property(&mut self, id: NodeId, property: AttributeProperty) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::ObjectNotFound(format!("node #{id}")))?;
        node.properties.retain(|p| p.name != property.name);
        node.properties.push(property);
        Ok(())
    }

    /// Resolve an instance's master.
    pub fn master_of(&self, instance: NodeId) -> Result<NodeId> {
        let node = self.node(instance);
        let master_path = node.master_path().ok_or_else(|| Error::InvalidInstance {
            path: node.path.clone(),
            reason: "not an instance".into(),
        })?;
        self.find(master_path).ok_or_else(|| Error::InvalidInstance {
            path: node.path.clone(),
            reason: format!("master {master_path} not found"),
        })
    }

    /// Check instance invariants.
    ///
    /// Every master must resolve to a non-instance node that is not an
    /// ancestor of its instance, and no chain of instances may lead back
    /// into itself.
    pub fn validate(&self) -> Result<()> {
        for (id, node) in self.iter() {
            if !node.is_instance() {
                continue;
            }
            let master = self.master_of(id)?;
            let reason = if self.node(master).is_instance() {
                Some("master is itself an instance")
            } else if self.is_ancestor_or_self(master, id) {
                Some("master is an ancestor of the instance")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(Error::InvalidInstance {
                    path: node.path.clone(),
                    reason: reason.into(),
                });
            }
        }

        let mut done = HashSet::new();
        for (id, node) in self.iter() {
            if node.is_instance() {
                let mut active = Vec::new();
                self.check_instance_cycle(id, &mut active, &mut done)?;
            }
        }
        Ok(())
    }

    fn check_instance_cycle(
        &self,
        instance: NodeId,
        active: &mut Vec<NodeId>,
        done: &mut HashSet<NodeId>,
    ) -> Result<()> {
        if done.contains(&instance) {
            return Ok(());
        }
        if active.contains(&instance) {
            return Err(Error::InvalidInstance {
                path: self.node(instance).path.clone(),
                reason: "cyclic instancing".into(),
            });
        }
        active.push(instance);
        let master = self.master_of(instance)?;
        for n in self.subtree(master) {
            if self.node(n).is_instance() {
                self.check_instance_cycle(n, active, done)?;
            }
        }
        active.pop();
        done.insert(instance);
        Ok(())
    }

    /// Copy of the graph restricted by `filter`.
    ///
    /// Exclusion covers whole subtrees: a node is dropped when it or any
    /// ancestor matches an exclude pattern. Inclusion reaches both ways: a
    /// node is kept when it, an ancestor or a descendant matches an include
    /// pattern. Kept instances bring their master subtree so the result still
    /// validates; an instance whose master is excluded is dropped.
    pub fn filtered(&self, filter: &SceneFilter) -> Result<Self> {
        if filter.is_empty() {
            return Ok(self.clone());
        }

        let order = self.subtree(Self::ROOT);
        let hit: Vec<bool> = self
            .nodes
            .iter()
            .map(|n| n.path != ROOT_PATH && filter.includes(&n.path))
            .collect();

        // Top-down: exclusion and inclusion inherited from ancestors.
        let mut excluded = vec![false; self.nodes.len()];
        let mut included = vec![!filter.has_include(); self.nodes.len()];
        for &id in order.iter().skip(1) {
            let node = self.node(id);
            let parent = node.parent.unwrap_or(Self::ROOT);
            excluded[id] = excluded[parent] || filter.excludes(&node.path);
            included[id] |= included[parent] || hit[id];
        }
        // Bottom-up: ancestors of an included node.
        let mut below = hit;
        for &id in order.iter().rev() {
            if below[id] {
                if let Some(parent) = self.node(id).parent {
                    below[parent] = true;
                }
            }
        }

        let mut keep = vec![false; self.nodes.len()];
        let mut pending: Vec<NodeId> = order
            .iter()
            .copied()
            .filter(|&id| (included[id] || below[id]) && !excluded[id])
            .collect();

        while let Some(id) = pending.pop() {
            if keep[id] || excluded[id] {
                continue;
            }
            if self.node(id).is_instance() {
                let master = self.master_of(id)?;
                if excluded[master] {
                    warn!(
                        instance = %self.node(id).path,
                        master = %self.node(master).path,
                        "Dropping instance of excluded master"
                    );
                    continue;
                }
                pending.extend(self.subtree(master));
            }
            keep[id] = true;
            pending.extend(self.ancestors(id));
        }
        keep[Self::ROOT] = true;

        let mut out = Self::new();
        out.nodes[Self::ROOT].properties = self.nodes[Self::ROOT].properties.clone();
        let mut mapped = vec![None; self.nodes.len()];
        mapped[Self::ROOT] = Some(Self::ROOT);

        for id in self.subtree(Self::ROOT).into_iter().skip(1) {
            if !keep[id] {
                continue;
            }
            let node = self.node(id);
            let Some(parent) = node.parent.and_then(|p| mapped[p]) else {
                continue;
            };
            let new_id = out.add_node(parent, node.name.clone(), node.kind.clone())?;
            out.nodes[new_id].properties = node.properties.clone();
            mapped[id] = Some(new_id);
        }

        out.validate()?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Serialized form: a nested tree
// ---------------------------------------------------------------------------

/// Nested node description used for the JSON dump.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDesc {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<AttributeProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDesc>,
}

impl SceneGraph {
    fn describe(&self, id: NodeId) -> NodeDesc {
        let node = self.node(id);
        NodeDesc {
            name: node.name.clone(),
            kind: node.kind.clone(),
            properties: node.properties.clone(),
            children: node.children.iter().map(|&c| self.describe(c)).collect(),
        }
    }

    fn insert_desc(&mut self, parent: NodeId, desc: NodeDesc) -> Result<()> {
        let id = self.add_node(parent, desc.name, desc.kind)?;
        self.nodes[id].properties = desc.properties;
        for child in desc.children {
            self.insert_desc(id, child)?;
        }
        Ok(())
    }
}

impl From<SceneGraph> for NodeDesc {
    fn from(graph: SceneGraph) -> Self {
        graph.describe(SceneGraph::ROOT)
    }
}

impl TryFrom<NodeDesc> for SceneGraph {
    type Error = Error;

    fn try_from(root: NodeDesc) -> Result<Self> {
        let mut graph = SceneGraph::new();
        graph.nodes[Self::ROOT].kind = root.kind;
        graph.nodes[Self::ROOT].properties = root.properties;
        for child in root.children {
            graph.insert_desc(Self::ROOT, child)?;
        }
        graph.validate()?;
        Ok(graph)
    }
}

impl Serialize for SceneGraph {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.describe(Self::ROOT).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SceneGraph {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let desc = NodeDesc::deserialize(deserializer)?;
        SceneGraph::try_from(desc).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Convenience builder addressing parents by path.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    graph: SceneGraph,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn parent(&self, parent_path: &str) -> Result<NodeId> {
        self.graph
            .find(parent_path)
            .ok_or_else(|| Error::ObjectNotFound(parent_path.to_string()))
    }

    /// Add a node under `parent_path`, returning the new node's path.
    pub fn add(&mut self, parent_path: &str, name: &str, kind: NodeKind) -> Result<String> {
        let parent = self.parent(parent_path)?;
        let id = self.graph.add_node(parent, name, kind)?;
        Ok(self.graph.node(id).path.clone())
    }

    pub fn transform(&mut self, parent_path: &str, name: &str, xform: XformSchema) -> Result<String> {
        self.add(parent_path, name, NodeKind::transform(xform))
    }

    pub fn mesh(&mut self, parent_path: &str, name: &str, mesh: MeshSchema) -> Result<String> {
        self.add(parent_path, name, NodeKind::Mesh(mesh))
    }

    pub fn instance(&mut self, parent_path: &str, name: &str, master_path: &str) -> Result<String> {
        self.add(
            parent_path,
            name,
            NodeKind::Instance {
                master_path: master_path.to_string(),
            },
        )
    }

    /// Attach a user property to the node at `path`.
    pub fn property(&mut self, path: &str, property: AttributeProperty) -> Result<&mut Self> {
        let id = self.parent(path)?;
        self.graph.add_property(id, property)?;
        Ok(self)
    }

    /// Validate and return the graph.
    pub fn build(self) -> Result<SceneGraph> {
        self.graph.validate()?;
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{visibility_property, PolyMeshSample};
    use glam::Vec3;

    fn quad() -> MeshSchema {
        MeshSchema::constant(PolyMeshSample::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![4],
            vec![0, 1, 2, 3],
        ))
    }

    fn sample_scene() -> SceneBuilder {
        let mut b = SceneBuilder::new();
        b.transform("/", "a", XformSchema::default()).unwrap();
        b.mesh("/a", "shape", quad()).unwrap();
        b.transform("/", "b", XformSchema::default()).unwrap();
        b.instance("/b", "inst", "/a").unwrap();
        b
    }

    #[test]
    fn test_paths_and_lookup() {
        let g = sample_scene().build().unwrap();
        let shape = g.find("/a/shape").unwrap();
        assert_eq!(g.node(shape).name, "shape");
        let a = g.find("/a").unwrap();
        assert_eq!(g.node(shape).parent, Some(a));
        assert_eq!(g.ancestors(shape).collect::<Vec<_>>(), vec![a, SceneGraph::ROOT]);
        assert!(g.find_node("/missing").is_err());
    }

    #[test]
    fn test_duplicate_and_bad_names() {
        let mut b = sample_scene();
        assert!(b.transform("/", "a", XformSchema::default()).is_err());
        assert!(b.transform("/", "x/y", XformSchema::default()).is_err());
        assert!(b.transform("/b/inst", "child", XformSchema::default()).is_err());
    }

    #[test]
    fn test_instance_validation() {
        let mut b = SceneBuilder::new();
        b.transform("/", "a", XformSchema::default()).unwrap();
        b.instance("/a", "self", "/a").unwrap();
        assert!(matches!(b.build(), Err(Error::InvalidInstance { .. })));

        let mut b = SceneBuilder::new();
        b.instance("/", "dangling", "/nowhere").unwrap();
        assert!(b.build().is_err());

        let mut b = sample_scene();
        b.instance("/", "chain", "/b/inst").unwrap();
        assert!(b.build().is_err());
    }

    #[test]
    fn test_mutual_instancing_is_cyclic() {
        let mut b = SceneBuilder::new();
        b.transform("/", "a", XformSchema::default()).unwrap();
        b.transform("/", "b", XformSchema::default()).unwrap();
        b.instance("/a", "to_b", "/b").unwrap();
        b.instance("/b", "to_a", "/a").unwrap();
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut b = sample_scene();
        b.property("/a", visibility_property(false)).unwrap();
        let g = b.build().unwrap();
        let json = serde_json::to_string(&g).unwrap();
        let back: SceneGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), g.len());
        let a = back.find_node("/a").unwrap();
        assert_eq!(a.properties.len(), 1);
        assert_eq!(back.find_node("/b/inst").unwrap().master_path(), Some("/a"));
    }

    #[test]
    fn test_filtered_keeps_ancestors_and_masters() {
        let g = sample_scene().build().unwrap();
        let f = g.filtered(&SceneFilter::new("/b/*", "")).unwrap();
        assert!(f.find("/b").is_some());
        assert!(f.find("/b/inst").is_some());
        assert!(f.find("/a/shape").is_some());

        let f = g.filtered(&SceneFilter::new("", "/b*")).unwrap();
        assert!(f.find("/b").is_none());
        assert!(f.find("/a/shape").is_some());
    }

    fn hero_scene() -> SceneGraph {
        let mut b = SceneBuilder::new();
        b.transform("/", "hero", XformSchema::default()).unwrap();
        b.mesh("/hero", "body", quad()).unwrap();
        b.transform("/", "bg", XformSchema::default()).unwrap();
        b.mesh("/bg", "ground", quad()).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_exclude_drops_whole_subtree() {
        let f = hero_scene().filtered(&SceneFilter::new("", "/hero")).unwrap();
        assert!(f.find("/hero").is_none());
        assert!(f.find("/hero/body").is_none());
        assert!(f.find("/bg/ground").is_some());

        // Exclusion wins over an include matching a descendant.
        let f = hero_scene().filtered(&SceneFilter::new("/hero/body", "/hero")).unwrap();
        assert!(f.find("/hero").is_none());
        assert!(f.find("/hero/body").is_none());
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn test_include_keeps_descendants_and_ancestors() {
        let f = hero_scene().filtered(&SceneFilter::new("/hero", "")).unwrap();
        assert!(f.find("/hero").is_some());
        assert!(f.find("/hero/body").is_some());
        assert!(f.find("/bg").is_none());

        let f = hero_scene().filtered(&SceneFilter::new("/bg/ground", "")).unwrap();
        assert!(f.find("/bg").is_some());
        assert!(f.find("/bg/ground").is_some());
        assert!(f.find("/hero").is_none());
    }

    #[test]
    fn test_instance_of_excluded_master_is_dropped() {
        let g = sample_scene().build().unwrap();
        let f = g.filtered(&SceneFilter::new("", "/a")).unwrap();
        assert!(f.find("/a").is_none());
        assert!(f.find("/b").is_some());
        assert!(f.find("/b/inst").is_none());
    }
}
