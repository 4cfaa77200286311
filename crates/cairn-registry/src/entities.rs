//! Records stored and returned by the registry

use cairn::{ContentHash, PackageTree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::reference::PackageRef;

/// An immutable package snapshot as held by the instance store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInstance {
    pub hash: ContentHash,
    pub tree: PackageTree,
    /// Author of the first push that introduced this content
    pub author: String,
    pub created_at: OffsetDateTime,
}

/// One entry in a package's push history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushLogEntry {
    /// UUIDv7, time-sortable but never used for ordering
    pub id: Uuid,
    pub package: PackageRef,
    /// Position in the package history, starting at 1 with no gaps
    pub sequence: u64,
    pub hash: ContentHash,
    pub author: String,
    pub pushed_at: OffsetDateTime,
}

impl PushLogEntry {
    /// Build the entry for the given sequence position, stamped now
    pub fn new(package: PackageRef, sequence: u64, hash: ContentHash, author: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            package,
            sequence,
            hash,
            author,
            pushed_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Everything needed to commit a push in one transaction
#[derive(Debug, Clone)]
pub struct NewPush {
    pub package: PackageRef,
    pub hash: ContentHash,
    pub tree: PackageTree,
    pub author: String,
    /// Move the `latest` tag to this instance as part of the push
    pub tag_latest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
    pub hash: ContentHash,
}

/// Consistent read of everything the log view joins together
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot {
    /// Push entries in ascending sequence order
    pub entries: Vec<PushLogEntry>,
    pub tags: Vec<Tag>,
    pub versions: Vec<Version>,
    /// Hashes of every instance stored for the package
    pub instances: HashSet<ContentHash>,
}

/// One row of the externally visible history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub sequence: u64,
    pub hash: ContentHash,
    pub author: String,
    pub pushed_at: OffsetDateTime,
    /// Tags currently pointing at `hash`, sorted
    pub tags: Vec<String>,
    /// Versions pointing at `hash`, sorted
    pub versions: Vec<String>,
}
