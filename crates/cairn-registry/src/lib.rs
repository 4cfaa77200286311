//! # Cairn Registry
//!
//! The bookkeeping side of the cairn package registry:
//! - Instances: immutable package trees keyed by their content hash
//! - Push log: per-package history with gap-free sequence numbers
//! - Tags: mutable names such as `latest` pointing at an instance
//! - Versions: write-once names pointing at an instance
//! - Access control: private, shared with users, or public
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cairn::{Leaf, PackageTree};
//! use cairn_registry::{MemoryStore, PackageRef, Registry, Viewer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new(MemoryStore::new());
//! let package = PackageRef::parse("alice/iris")?;
//!
//! let mut tree = PackageTree::new();
//! tree.insert_leaf(tree.root(), "data.csv", Leaf::new(["9f86d081"]))?;
//!
//! let entry = registry.push(&package, tree, "alice", true).await?;
//! registry.assign_version(&package, "1.0.0", &entry.hash).await?;
//!
//! for record in registry.get_log(&package, &Viewer::user("alice")).await? {
//!     println!("{} {} {:?}", record.sequence, record.hash, record.tags);
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod entities;
pub mod error;
pub mod log_view;
pub mod reference;
pub mod registry;
pub mod storage;

pub use access::{Access, AccessGate, Grantee, PUBLIC, Viewer};
pub use entities::{LogRecord, PushLogEntry, StoredInstance, Tag, Version};
pub use error::{ReferenceError, RegistryError, Result};
pub use reference::{LATEST_TAG, PackageRef};
pub use registry::Registry;
pub use storage::{MemoryStore, RegistryStore};

#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
