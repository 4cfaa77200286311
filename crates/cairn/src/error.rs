//! Error types for the cairn library
//!
//! Tree errors describe structurally invalid package trees. They are raised
//! before any hash is produced, so a malformed tree never gets an identity.

use thiserror::Error;

use crate::tree::NodeId;

/// Errors raised while building, validating or hashing a package tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node {0} does not exist in this tree")]
    DanglingNode(NodeId),

    #[error("Node {0} is not a group and cannot have children")]
    NotAGroup(NodeId),

    #[error("Tree root must be a group")]
    RootNotGroup,

    #[error("Cycle detected at node {0}")]
    Cycle(NodeId),

    #[error("Node {0} is reachable from more than one parent")]
    SharedNode(NodeId),

    #[error("Tree is nested deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("Child names cannot be empty")]
    EmptyName,
}

/// Error returned when a string is not a valid content hash
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    #[error("Hash must be 64 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("Hash contains non-hexadecimal characters")]
    InvalidCharacter,
}

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
