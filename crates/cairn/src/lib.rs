//! Cairn is the content-addressing layer of the cairn package registry.
//!
//! Packages are hierarchical trees of groups and leaves. Every tree has a
//! deterministic [`ContentHash`] that depends only on its structure and leaf
//! content, so identical data pushed from different machines, or built in a
//! different order, always lands on the same instance.
//!
//! ```rust
//! use cairn::{Leaf, PackageTree, hash_tree};
//!
//! let mut tree = PackageTree::new();
//! let raw = tree.insert_group(tree.root(), "raw").unwrap();
//! tree.insert_leaf(raw, "iris", Leaf::new(["9f86d081"])).unwrap();
//!
//! let hash = hash_tree(&tree).unwrap();
//! println!("instance {hash}");
//! ```

pub mod error;
pub mod hash;
pub mod tree;

pub use error::{HashParseError, Result, TreeError};
pub use hash::{ContentHash, TREE_FORMAT, hash_tree};
pub use tree::{Leaf, MAX_TREE_DEPTH, Node, NodeId, PackageTree, TreeNode};

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
