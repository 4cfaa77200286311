//! Deterministic content hashing of package trees
//!
//! The encoding is length-prefixed and versioned: the stream opens with
//! [`TREE_FORMAT`], strings are written as a big-endian `u32` length followed by
//! their UTF-8 bytes, and counts as big-endian `u32`. Group children are
//! visited in lexicographic name order. Changing any of this requires a new
//! format tag so old and new hashes can never collide.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{HashParseError, Result, TreeError};
use crate::tree::{Leaf, Node, NodeId, PackageTree};

/// Format tag written at the start of every tree encoding
pub const TREE_FORMAT: &str = "cairn-tree:1";

const GROUP_TAG: &str = "GROUP";
const LEAF_TAG: &str = "LEAF";

/// SHA-256 digest identifying a package instance
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation (64 characters)
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashParseError;

    /// Parse 64 hex characters, optionally prefixed with `sha256:`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let hex = s.strip_prefix("sha256:").unwrap_or(s);
        if hex.len() != 64 {
            return Err(HashParseError::InvalidLength(hex.len()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashParseError::InvalidCharacter);
        }

        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| HashParseError::InvalidCharacter)?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the content hash of a tree
///
/// The tree is validated first; malformed trees never receive a hash.
/// Unreachable arena nodes do not contribute.
pub fn hash_tree(tree: &PackageTree) -> Result<ContentHash> {
    tree.validate()?;

    let mut encoder = TreeEncoder::new();
    encoder.write_str(TREE_FORMAT);
    encoder.write_node(tree, tree.root())?;
    Ok(encoder.finish())
}

struct TreeEncoder {
    hasher: Sha256,
}

impl TreeEncoder {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn write_u32(&mut self, value: u32) {
        self.hasher.update(value.to_be_bytes());
    }

    fn write_len(&mut self, len: usize) {
        // Validated trees and leaf payloads stay far below u32::MAX entries.
        self.write_u32(len as u32);
    }

    fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.hasher.update(value.as_bytes());
    }

    fn write_node(&mut self, tree: &PackageTree, id: NodeId) -> Result<()> {
        match tree.node(id).ok_or(TreeError::DanglingNode(id))? {
            Node::Group { children } => {
                self.write_str(GROUP_TAG);
                self.write_len(children.len());
                // BTreeMap iteration is already sorted by name
                for (name, child) in children {
                    self.write_str(name);
                    self.write_node(tree, *child)?;
                }
            }
            Node::Leaf(leaf) => self.write_leaf(leaf),
        }
        Ok(())
    }

    fn write_leaf(&mut self, leaf: &Leaf) {
        self.write_str(LEAF_TAG);
        self.write_len(leaf.hashes.len());
        for hash in &leaf.hashes {
            self.write_str(hash);
        }
        self.write_len(leaf.metadata.len());
        for (key, value) in &leaf.metadata {
            self.write_str(key);
            self.write_str(value);
        }
    }

    fn finish(self) -> ContentHash {
        ContentHash(self.hasher.finalize().into())
    }
}
