//! Error types for the cairn registry

use cairn::{ContentHash, TreeError};
use thiserror::Error;

use crate::reference::PackageRef;

/// Registry-specific errors
///
/// `PackageNotFound` is returned both for packages that do not exist and for
/// packages the viewer may not see. Callers cannot tell the two apart.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Package not found: {0}")]
    PackageNotFound(PackageRef),

    #[error("Instance {hash} not found in {package}")]
    InstanceNotFound {
        package: PackageRef,
        hash: ContentHash,
    },

    #[error("Tag '{tag}' not found in {package}")]
    TagNotFound { package: PackageRef, tag: String },

    #[error("Version '{version}' not found in {package}")]
    VersionNotFound { package: PackageRef, version: String },

    #[error("{grantee} has no access to {package}")]
    ShareNotFound { package: PackageRef, grantee: String },

    #[error("Version '{version}' of {package} already points to {existing}")]
    VersionConflict {
        package: PackageRef,
        version: String,
        existing: ContentHash,
        requested: ContentHash,
    },

    #[error("Malformed package tree: {0}")]
    MalformedInput(#[from] TreeError),

    #[error("Invalid reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Time error: {0}")]
    Time(#[from] time::error::ComponentRange),
}

impl RegistryError {
    /// Whether the error means "nothing there" from the caller's point of view
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::PackageNotFound(_)
                | RegistryError::InstanceNotFound { .. }
                | RegistryError::TagNotFound { .. }
                | RegistryError::VersionNotFound { .. }
                | RegistryError::ShareNotFound { .. }
        )
    }
}

/// Errors for owner, package, tag and version names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Invalid package reference '{reference}': {reason}")]
    InvalidFormat { reference: String, reason: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
