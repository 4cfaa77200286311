//! Storage abstraction for registry data
//!
//! Each component of the registry has its own trait. A backend implements all
//! of them plus [`RegistryStore`], which adds the operations that span several
//! tables and therefore need one transaction.
//!
//! Every method is a single atomic unit of work. Writes that reference an
//! instance check that it exists inside the same unit of work.

use async_trait::async_trait;
use cairn::{ContentHash, PackageTree};

use crate::access::Grantee;
use crate::entities::{LogSnapshot, NewPush, PushLogEntry, StoredInstance, Tag, Version};
use crate::error::Result;
use crate::reference::PackageRef;

pub mod memory;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStore;

/// Durable, append-only mapping from (package, hash) to tree snapshots
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Store `tree` under `hash` if absent, creating the package if needed.
    /// Returns whether a new instance was written.
    async fn put_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        tree: &PackageTree,
        author: &str,
    ) -> Result<bool>;

    async fn get_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
    ) -> Result<Option<StoredInstance>>;
}

/// Ordered push history per package
#[async_trait]
pub trait PushLog: Send + Sync {
    /// Append an entry for an existing instance, assigning the next sequence.
    /// Fails with `InstanceNotFound` if the instance does not exist.
    async fn append(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        author: &str,
    ) -> Result<PushLogEntry>;

    /// All entries in ascending sequence order
    async fn list_log(&self, package: &PackageRef) -> Result<Vec<PushLogEntry>>;
}

/// Mutable tag namespace
#[async_trait]
pub trait TagRegistry: Send + Sync {
    /// Point `tag` at `hash`, overwriting any previous target.
    /// Fails with `InstanceNotFound` if the instance does not exist.
    async fn set_tag(&self, package: &PackageRef, tag: &str, hash: &ContentHash) -> Result<()>;

    async fn resolve_tag(&self, package: &PackageRef, tag: &str) -> Result<Option<ContentHash>>;

    /// Returns whether the tag existed
    async fn remove_tag(&self, package: &PackageRef, tag: &str) -> Result<bool>;

    /// Tags sorted by name
    async fn list_tags(&self, package: &PackageRef) -> Result<Vec<Tag>>;
}

/// Write-once version namespace
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    /// Assign `version` to `hash`.
    ///
    /// Re-assigning the same hash is a no-op. A different hash fails with
    /// `VersionConflict`; a missing instance with `InstanceNotFound`.
    async fn set_version(
        &self,
        package: &PackageRef,
        version: &str,
        hash: &ContentHash,
    ) -> Result<()>;

    async fn resolve_version(
        &self,
        package: &PackageRef,
        version: &str,
    ) -> Result<Option<ContentHash>>;

    /// Versions sorted by version string
    async fn list_versions(&self, package: &PackageRef) -> Result<Vec<Version>>;
}

/// Share grants per package
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Grants of the package, or `None` if the package does not exist
    async fn package_grants(&self, package: &PackageRef) -> Result<Option<Vec<Grantee>>>;

    /// Add a grant; fails with `PackageNotFound` if the package does not exist
    async fn add_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<()>;

    /// Returns whether the grant existed
    async fn remove_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<bool>;
}

/// Complete storage substrate for a registry
#[async_trait]
pub trait RegistryStore: InstanceStore + PushLog + TagRegistry + VersionRegistry + GrantStore {
    /// Store the instance, append the log entry and optionally move `latest`,
    /// all or nothing
    async fn commit_push(&self, push: NewPush) -> Result<PushLogEntry>;

    /// Read log entries, tags, versions and instance hashes from one snapshot
    async fn log_snapshot(&self, package: &PackageRef) -> Result<LogSnapshot>;
}
