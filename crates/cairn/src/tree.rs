//! Package trees
//!
//! A [`PackageTree`] is an arena of nodes referenced by [`NodeId`]. Groups map
//! child names to node ids through a `BTreeMap`, so the order in which children
//! were inserted never leaks into the tree's identity.
//!
//! Because children are ids rather than owned values, an arena can describe
//! cycles or shared subtrees. Those are rejected by [`PackageTree::validate`],
//! which every hashing path runs first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TreeError};

/// Maximum nesting depth accepted for a package tree
pub const MAX_TREE_DEPTH: usize = 256;

/// Index of a node inside a [`PackageTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to stored content
///
/// `hashes` are the digests of the blob fragments that make up the leaf, in
/// order. `metadata` carries descriptive fields such as the original file
/// format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Leaf {
    /// Create a leaf from its fragment digests
    pub fn new<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hashes: hashes.into_iter().map(Into::into).collect(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A node stored in the arena
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Node {
    Group { children: BTreeMap<String, NodeId> },
    Leaf(Leaf),
}

/// Arena-backed package tree with a group as its root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for PackageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageTree {
    /// Create a tree holding only an empty root group
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Group {
                children: BTreeMap::new(),
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes in the arena, including unreachable ones
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a detached empty group and return its id
    pub fn add_group(&mut self) -> NodeId {
        self.push_node(Node::Group {
            children: BTreeMap::new(),
        })
    }

    /// Add a detached leaf and return its id
    pub fn add_leaf(&mut self, leaf: Leaf) -> NodeId {
        self.push_node(Node::Leaf(leaf))
    }

    /// Link `child` under `parent` as `name`, replacing any previous child of that name
    pub fn attach(&mut self, parent: NodeId, name: impl Into<String>, child: NodeId) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(TreeError::EmptyName);
        }
        if self.node(child).is_none() {
            return Err(TreeError::DanglingNode(child));
        }

        match self.nodes.get_mut(parent.index()) {
            Some(Node::Group { children }) => {
                children.insert(name, child);
                Ok(())
            }
            Some(Node::Leaf(_)) => Err(TreeError::NotAGroup(parent)),
            None => Err(TreeError::DanglingNode(parent)),
        }
    }

    /// Create an empty group named `name` under `parent`
    pub fn insert_group(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        let id = self.add_group();
        self.attach(parent, name, id)?;
        Ok(id)
    }

    /// Create a leaf named `name` under `parent`
    pub fn insert_leaf(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        leaf: Leaf,
    ) -> Result<NodeId> {
        let id = self.add_leaf(leaf);
        self.attach(parent, name, id)?;
        Ok(id)
    }

    /// Check that the nodes reachable from the root form a proper tree
    ///
    /// Rejects dangling ids, cycles, nodes with more than one parent, empty
    /// child names and nesting deeper than [`MAX_TREE_DEPTH`].
    pub fn validate(&self) -> Result<()> {
        match self.node(self.root) {
            Some(Node::Group { .. }) => {}
            Some(Node::Leaf(_)) => return Err(TreeError::RootNotGroup),
            None => return Err(TreeError::DanglingNode(self.root)),
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        self.check(self.root, 0, &mut marks)
    }

    fn check(&self, id: NodeId, depth: usize, marks: &mut [Mark]) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(TreeError::TooDeep {
                max: MAX_TREE_DEPTH,
            });
        }

        let node = self.node(id).ok_or(TreeError::DanglingNode(id))?;
        match marks[id.index()] {
            Mark::Unvisited => {}
            Mark::OnPath => return Err(TreeError::Cycle(id)),
            Mark::Done => return Err(TreeError::SharedNode(id)),
        }

        marks[id.index()] = Mark::OnPath;
        if let Node::Group { children } = node {
            for (name, child) in children {
                if name.is_empty() {
                    return Err(TreeError::EmptyName);
                }
                self.check(*child, depth + 1, marks)?;
            }
        }
        marks[id.index()] = Mark::Done;

        Ok(())
    }

    /// Build an arena tree from its nested form
    pub fn from_nested(root: &TreeNode) -> Result<Self> {
        let children = match root {
            TreeNode::Group { children } => children,
            TreeNode::Leaf(_) => return Err(TreeError::RootNotGroup),
        };

        let mut tree = Self::new();
        let root_id = tree.root;
        for (name, child) in children {
            tree.graft(root_id, name, child, 1)?;
        }
        Ok(tree)
    }

    fn graft(&mut self, parent: NodeId, name: &str, node: &TreeNode, depth: usize) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(TreeError::TooDeep {
                max: MAX_TREE_DEPTH,
            });
        }

        match node {
            TreeNode::Leaf(leaf) => {
                self.insert_leaf(parent, name, leaf.clone())?;
            }
            TreeNode::Group { children } => {
                let id = self.insert_group(parent, name)?;
                for (child_name, child) in children {
                    self.graft(id, child_name, child, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Convert the reachable part of the tree into its nested form
    pub fn to_nested(&self) -> Result<TreeNode> {
        self.validate()?;
        self.nest(self.root)
    }

    fn nest(&self, id: NodeId) -> Result<TreeNode> {
        match self.node(id).ok_or(TreeError::DanglingNode(id))? {
            Node::Leaf(leaf) => Ok(TreeNode::Leaf(leaf.clone())),
            Node::Group { children } => {
                let mut nested = BTreeMap::new();
                for (name, child) in children {
                    nested.insert(name.clone(), self.nest(*child)?);
                }
                Ok(TreeNode::Group { children: nested })
            }
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Owned, nested form of a package tree used on the wire
///
/// ```json
/// {"type": "GROUP", "children": {"raw": {"type": "LEAF", "hashes": ["..."]}}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TreeNode {
    Group { children: BTreeMap<String, TreeNode> },
    Leaf(Leaf),
}

impl TreeNode {
    /// Build a group from `(name, child)` pairs
    pub fn group<I, K>(children: I) -> Self
    where
        I: IntoIterator<Item = (K, TreeNode)>,
        K: Into<String>,
    {
        TreeNode::Group {
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn leaf(leaf: Leaf) -> Self {
        TreeNode::Leaf(leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut tree = PackageTree::new();
        let raw = tree.insert_group(tree.root(), "raw").unwrap();
        let leaf = tree
            .insert_leaf(raw, "iris.csv", Leaf::new(["abc"]))
            .unwrap();

        assert_eq!(tree.len(), 3);
        assert!(matches!(tree.node(leaf), Some(Node::Leaf(_))));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_attach_to_leaf_fails() {
        let mut tree = PackageTree::new();
        let leaf = tree.insert_leaf(tree.root(), "a", Leaf::default()).unwrap();
        let other = tree.add_group();

        assert_eq!(
            tree.attach(leaf, "child", other),
            Err(TreeError::NotAGroup(leaf))
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut tree = PackageTree::new();
        let group = tree.add_group();
        assert_eq!(tree.attach(tree.root(), "", group), Err(TreeError::EmptyName));
    }

    #[test]
    fn test_cycle_detected() {
        let mut tree = PackageTree::new();
        let a = tree.insert_group(tree.root(), "a").unwrap();
        let b = tree.insert_group(a, "b").unwrap();
        tree.attach(b, "back", a).unwrap();

        assert_eq!(tree.validate(), Err(TreeError::Cycle(a)));
    }

    #[test]
    fn test_self_loop_on_root_detected() {
        let mut tree = PackageTree::new();
        let root = tree.root();
        tree.attach(root, "me", root).unwrap();

        assert_eq!(tree.validate(), Err(TreeError::Cycle(root)));
    }

    #[test]
    fn test_shared_subtree_rejected() {
        let mut tree = PackageTree::new();
        let shared = tree.add_leaf(Leaf::new(["abc"]));
        tree.attach(tree.root(), "one", shared).unwrap();
        tree.attach(tree.root(), "two", shared).unwrap();

        assert_eq!(tree.validate(), Err(TreeError::SharedNode(shared)));
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = PackageTree::new();
        let mut parent = tree.root();
        for _ in 0..=MAX_TREE_DEPTH {
            parent = tree.insert_group(parent, "deeper").unwrap();
        }

        assert_eq!(
            tree.validate(),
            Err(TreeError::TooDeep {
                max: MAX_TREE_DEPTH
            })
        );
    }

    #[test]
    fn test_nested_roundtrip_preserves_structure() {
        let nested = TreeNode::group([
            ("foo", TreeNode::group::<_, String>([])),
            (
                "bar",
                TreeNode::leaf(Leaf::new(["h1", "h2"]).with_metadata("format", "csv")),
            ),
        ]);

        let tree = PackageTree::from_nested(&nested).unwrap();
        assert_eq!(tree.to_nested().unwrap(), nested);
    }

    #[test]
    fn test_leaf_root_rejected() {
        let nested = TreeNode::leaf(Leaf::new(["h1"]));
        assert_eq!(
            PackageTree::from_nested(&nested),
            Err(TreeError::RootNotGroup)
        );
    }

    #[test]
    fn test_deserialized_dangling_root_rejected() {
        let tree: PackageTree =
            serde_json::from_str(r#"{"nodes": [], "root": 3}"#).unwrap();
        assert!(matches!(tree.validate(), Err(TreeError::DanglingNode(_))));
    }
}
