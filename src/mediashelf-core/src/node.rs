use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// A tree-scoped node identifier.
///
/// Parsers MUST derive ids from something stable in their source (a canonical
/// path, a catalog primary key) so that the same item keeps the same id across
/// refreshes. Ids are opaque and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&NodeId> for NodeId {
    fn from(value: &NodeId) -> Self {
        value.clone()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Folder, album, playlist: anything the browser can expand.
    Container,
    /// A single media item (image, track, movie).
    Item,
}

/// One entry of a media source's catalog.
///
/// Structure (children and parent) is owned by the [`LibraryTree`] the node
/// lives in and can only be changed through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    children: Vec<NodeId>,
    metadata: BTreeMap<String, String>,
    resource_location: Option<String>,
    parent: Option<NodeId>,
}

impl LibraryNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            children: Vec::new(),
            metadata: BTreeMap::new(),
            resource_location: None,
            parent: None,
        }
    }

    pub fn container(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Container)
    }

    pub fn item(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Item)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_location(mut self, location: impl Into<String>) -> Self {
        self.resource_location = Some(location.into());
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    /// Child ids in source order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    /// Looks up a metadata value on this node only; ancestors are not consulted.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata_map(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the previous value for `key`, if any.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.metadata.insert(key.into(), value.into())
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    pub fn resource_location(&self) -> Option<&str> {
        self.resource_location.as_deref()
    }

    pub fn set_resource_location(&mut self, location: Option<String>) {
        self.resource_location = location;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    pub(crate) fn replace_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.metadata = metadata;
    }

    pub(crate) fn set_children(&mut self, children: Vec<NodeId>) {
        self.children = children;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    /// A copy of this node without structure, ready to be inserted elsewhere.
    pub(crate) fn detached(&self) -> Self {
        Self {
            children: Vec::new(),
            parent: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureViolation {
    #[error("node {id} is {parent} or one of its ancestors; adding it would create a cycle")]
    Cycle { id: NodeId, parent: NodeId },
    #[error("node id {id} already exists in the tree")]
    DuplicateId { id: NodeId },
    #[error("the root node {id} cannot be moved")]
    RootMove { id: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("invalid structure: {0}")]
    InvalidStructure(StructureViolation),
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },
}

impl TreeError {
    fn not_found(id: &NodeId) -> Self {
        Self::NodeNotFound { id: id.clone() }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Arena holding every node of one media source's hierarchy.
///
/// The arena is the only owner of nodes; parent links are ids used for
/// traversal and path reconstruction. Ids are unique across the whole tree,
/// which is what lets a refresh correlate old and new nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTree {
    root: NodeId,
    nodes: HashMap<NodeId, LibraryNode>,
}

impl LibraryTree {
    pub fn new(root: LibraryNode) -> Self {
        let root = root.detached();
        let id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(id.clone(), root);
        Self { root: id, nodes }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    pub fn root(&self) -> &LibraryNode {
        &self.nodes[&self.root]
    }

    pub fn get(&self, id: &NodeId) -> Option<&LibraryNode> {
        self.nodes.get(id)
    }

    /// Mutable access for name, metadata and resource edits. Structure can
    /// only change through the tree's own methods.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut LibraryNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a LibraryNode> + 'a {
        let ids: &'a [NodeId] = self
            .nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[]);
        ids.iter().filter_map(move |child| self.nodes.get(child))
    }

    pub fn parent(&self, id: &NodeId) -> Option<&LibraryNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent.as_ref())
            .and_then(|p| self.nodes.get(p))
    }

    /// Walks parent links upwards, starting with the parent of `id`.
    pub fn ancestors(&self, id: &NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes.get(id).and_then(|n| n.parent.as_ref()),
            remaining: self.nodes.len(),
        }
    }

    /// True when `candidate` is `of` itself or one of its ancestors.
    pub fn is_ancestor_or_self(&self, candidate: &NodeId, of: &NodeId) -> bool {
        candidate == of || self.ancestors(of).any(|n| &n.id == candidate)
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn path(&self, id: &NodeId) -> Option<Vec<&LibraryNode>> {
        let node = self.nodes.get(id)?;
        let mut path: Vec<&LibraryNode> = self.ancestors(id).collect();
        path.reverse();
        path.push(node);
        Some(path)
    }

    /// Appends `node` as the last child of `parent`.
    ///
    /// Fails without touching the tree if `node`'s id is `parent` or one of
    /// its ancestors, or if the id is used anywhere else in the tree.
    pub fn add_child(&mut self, parent: &NodeId, node: LibraryNode) -> TreeResult<()> {
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::not_found(parent));
        }
        self.check_insertable(parent, &node.id)?;

        let mut node = node.detached();
        node.parent = Some(parent.clone());
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        Ok(())
    }

    /// Attaches every node of `subtree` below `parent`, keeping its shape.
    /// All ids are checked before anything is inserted.
    pub fn graft(&mut self, parent: &NodeId, subtree: LibraryTree) -> TreeResult<()> {
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::not_found(parent));
        }
        for id in subtree.nodes.keys() {
            self.check_insertable(parent, id)?;
        }

        let LibraryTree { root, nodes } = subtree;
        for (id, mut node) in nodes {
            if id == root {
                node.parent = Some(parent.clone());
            }
            self.nodes.insert(id, node);
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(root);
        }
        Ok(())
    }

    /// Moves the subtree at `id` below `new_parent`, at `position` among its
    /// children (appended when `None` or out of range).
    pub fn move_node(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        position: Option<usize>,
    ) -> TreeResult<()> {
        if !self.nodes.contains_key(id) {
            return Err(TreeError::not_found(id));
        }
        if !self.nodes.contains_key(new_parent) {
            return Err(TreeError::not_found(new_parent));
        }
        if id == &self.root {
            return Err(TreeError::InvalidStructure(StructureViolation::RootMove {
                id: id.clone(),
            }));
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(TreeError::InvalidStructure(StructureViolation::Cycle {
                id: id.clone(),
                parent: new_parent.clone(),
            }));
        }

        let old_parent = self.nodes.get(id).and_then(|n| n.parent.clone());
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.retain(|c| c != id);
        }
        if let Some(target) = self.nodes.get_mut(new_parent) {
            match position {
                Some(pos) if pos < target.children.len() => target.children.insert(pos, id.clone()),
                _ => target.children.push(id.clone()),
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent.clone());
        }
        Ok(())
    }

    /// Removes the child `id` of `parent` together with its subtree.
    /// Returns `false` (and does nothing) if `id` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: &NodeId, id: &NodeId) -> bool {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(index) = parent_node.children.iter().position(|c| c == id) else {
            return false;
        };
        parent_node.children.remove(index);
        self.drop_subtree(id);
        true
    }

    /// Depth-first search for `id` strictly below `from`.
    pub fn find_descendant(&self, from: &NodeId, id: &NodeId) -> Option<&LibraryNode> {
        self.depth_first_from(from).skip(1).find(|n| &n.id == id)
    }

    /// Deep copy of the subtree rooted at `id`; the copy's root has no parent.
    pub fn subtree(&self, id: &NodeId) -> Option<LibraryTree> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        let nodes = self
            .depth_first_from(id)
            .map(|n| {
                let mut copy = n.clone();
                if &copy.id == id {
                    copy.parent = None;
                }
                (copy.id.clone(), copy)
            })
            .collect();
        Some(LibraryTree {
            root: id.clone(),
            nodes,
        })
    }

    /// Pre-order traversal of the whole tree in child order.
    pub fn depth_first(&self) -> DepthFirst<'_> {
        self.depth_first_from(&self.root)
    }

    pub fn depth_first_from(&self, id: &NodeId) -> DepthFirst<'_> {
        let stack = self.nodes.get(id).map(|n| vec![n]).unwrap_or_default();
        DepthFirst { tree: self, stack }
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    fn check_insertable(&self, parent: &NodeId, id: &NodeId) -> TreeResult<()> {
        if !self.nodes.contains_key(id) {
            return Ok(());
        }
        let violation = if self.is_ancestor_or_self(id, parent) {
            StructureViolation::Cycle {
                id: id.clone(),
                parent: parent.clone(),
            }
        } else {
            StructureViolation::DuplicateId { id: id.clone() }
        };
        Err(TreeError::InvalidStructure(violation))
    }

    pub(crate) fn drop_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let doomed: Vec<NodeId> = self.depth_first_from(id).map(|n| n.id.clone()).collect();
        for id in &doomed {
            self.nodes.remove(id);
        }
        doomed
    }

    pub(crate) fn insert_detached(&mut self, node: LibraryNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Removes a single node without touching its relatives' links.
    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<LibraryNode> {
        if id == &self.root {
            return None;
        }
        self.nodes.remove(id)
    }
}

pub struct Ancestors<'a> {
    tree: &'a LibraryTree,
    next: Option<&'a NodeId>,
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a LibraryNode;

    fn next(&mut self) -> Option<Self::Item> {
        // Parent links are trusted to be acyclic; the budget keeps a corrupted
        // tree from looping forever.
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let tree = self.tree;
        let node = tree.nodes.get(self.next?)?;
        self.next = node.parent.as_ref();
        Some(node)
    }
}

pub struct DepthFirst<'a> {
    tree: &'a LibraryTree,
    stack: Vec<&'a LibraryNode>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a LibraryNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let tree = self.tree;
        self.stack.extend(
            node.children
                .iter()
                .rev()
                .filter_map(|child| tree.nodes.get(child)),
        );
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LibraryTree {
        let mut tree = LibraryTree::new(LibraryNode::container("root", "Photos"));
        let root = NodeId::new("root");
        tree.add_child(&root, LibraryNode::container("a", "Album A"))
            .unwrap();
        tree.add_child(&root, LibraryNode::container("b", "Album B"))
            .unwrap();
        tree.add_child(
            &NodeId::new("a"),
            LibraryNode::item("a/1", "Beach.jpg").with_resource_location("file:///a/1.jpg"),
        )
        .unwrap();
        tree
    }

    fn names<'a>(tree: &'a LibraryTree, id: &str) -> Vec<&'a str> {
        tree.children(&NodeId::new(id)).map(|n| n.name()).collect()
    }

    #[test]
    fn add_child_keeps_source_order() {
        let tree = sample();
        assert_eq!(names(&tree, "root"), vec!["Album A", "Album B"]);
        assert_eq!(tree.node_count(), 4);
        assert_eq!(
            tree.parent(&NodeId::new("a/1")).map(|n| n.name()),
            Some("Album A")
        );
    }

    #[test]
    fn adding_an_ancestor_is_rejected_and_tree_unchanged() {
        let mut tree = sample();
        let before = tree.clone();

        let err = tree
            .add_child(&NodeId::new("a"), LibraryNode::container("root", "again"))
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidStructure(StructureViolation::Cycle { .. })
        ));

        let err = tree
            .add_child(&NodeId::new("a"), LibraryNode::container("a", "self"))
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidStructure(StructureViolation::Cycle { .. })
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut tree = sample();
        let err = tree
            .add_child(&NodeId::new("b"), LibraryNode::item("a/1", "copy"))
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidStructure(StructureViolation::DuplicateId { .. })
        ));
    }

    #[test]
    fn move_into_own_subtree_is_a_cycle() {
        let mut tree = sample();
        let before = tree.clone();
        let err = tree
            .move_node(&NodeId::new("a"), &NodeId::new("a/1"), None)
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidStructure(_)));
        assert_eq!(tree, before);

        tree.move_node(&NodeId::new("b"), &NodeId::new("root"), Some(0))
            .unwrap();
        assert_eq!(names(&tree, "root"), vec!["Album B", "Album A"]);
    }

    #[test]
    fn remove_child_drops_subtree_and_ignores_absent_ids() {
        let mut tree = sample();
        assert!(!tree.remove_child(&NodeId::new("root"), &NodeId::new("missing")));
        assert!(!tree.remove_child(&NodeId::new("b"), &NodeId::new("a/1")));
        assert_eq!(tree.node_count(), 4);

        assert!(tree.remove_child(&NodeId::new("root"), &NodeId::new("a")));
        assert!(!tree.contains(&NodeId::new("a/1")));
        assert_eq!(names(&tree, "root"), vec!["Album B"]);
    }

    #[test]
    fn find_descendant_searches_below_start() {
        let tree = sample();
        let root = NodeId::new("root");
        let found = tree.find_descendant(&root, &NodeId::new("a/1")).unwrap();
        assert_eq!(found.resource_location(), Some("file:///a/1.jpg"));
        assert!(tree
            .find_descendant(&NodeId::new("b"), &NodeId::new("a/1"))
            .is_none());
    }

    #[test]
    fn path_runs_from_root_to_node() {
        let tree = sample();
        let path: Vec<_> = tree
            .path(&NodeId::new("a/1"))
            .unwrap()
            .into_iter()
            .map(|n| n.id().as_str())
            .collect();
        assert_eq!(path, vec!["root", "a", "a/1"]);
    }

    #[test]
    fn subtree_is_an_independent_copy() {
        let mut tree = sample();
        let copy = tree.subtree(&NodeId::new("a")).unwrap();
        assert!(copy.root().parent().is_none());
        assert_eq!(copy.node_count(), 2);

        tree.get_mut(&NodeId::new("a/1"))
            .unwrap()
            .set_metadata("rating", "5");
        assert!(copy
            .get(&NodeId::new("a/1"))
            .unwrap()
            .metadata("rating")
            .is_none());
    }

    #[test]
    fn graft_checks_every_id_first() {
        let mut tree = sample();
        let mut extra = LibraryTree::new(LibraryNode::container("c", "Album C"));
        extra
            .add_child(&NodeId::new("c"), LibraryNode::item("a/1", "clash"))
            .unwrap();
        let before = tree.clone();
        assert!(tree.graft(&NodeId::new("root"), extra).is_err());
        assert_eq!(tree, before);

        let extra = LibraryTree::new(LibraryNode::container("c", "Album C"));
        tree.graft(&NodeId::new("root"), extra).unwrap();
        assert_eq!(names(&tree, "root"), vec!["Album A", "Album B", "Album C"]);
    }

    #[test]
    fn metadata_is_not_inherited() {
        let mut tree = sample();
        tree.get_mut(&NodeId::new("a"))
            .unwrap()
            .set_metadata("camera", "X100");
        let leaf = tree.get(&NodeId::new("a/1")).unwrap();
        assert!(leaf.metadata("camera").is_none());
    }
}
