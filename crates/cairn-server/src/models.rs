//! API models for requests and responses

use cairn::{ContentHash, TreeNode};
use cairn_registry::{Grantee, LogRecord, PushLogEntry, Tag, Version};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Query parameters of a package push
#[derive(Debug, Deserialize)]
pub struct PushQuery {
    #[serde(default = "default_tag_latest")]
    pub tag_latest: bool,
}

fn default_tag_latest() -> bool {
    true
}

/// Body of a package push
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub contents: TreeNode,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub hash: ContentHash,
    pub sequence: u64,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl From<PushLogEntry> for PushResponse {
    fn from(entry: PushLogEntry) -> Self {
        Self {
            hash: entry.hash,
            sequence: entry.sequence,
            author: entry.author,
            created: entry.pushed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub hash: ContentHash,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub contents: TreeNode,
}

/// Body of tag and version writes, and response of their lookups
#[derive(Debug, Serialize, Deserialize)]
pub struct HashBody {
    pub hash: ContentHash,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub logs: Vec<LogItem>,
}

/// One row of the package log
///
/// `tags` and `versions` are `null` rather than empty when nothing points at
/// the instance.
#[derive(Debug, Serialize)]
pub struct LogItem {
    pub hash: ContentHash,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub sequence: u64,
    pub tags: Option<Vec<String>>,
    pub versions: Option<Vec<String>>,
}

fn non_empty(names: Vec<String>) -> Option<Vec<String>> {
    if names.is_empty() { None } else { Some(names) }
}

impl From<LogRecord> for LogItem {
    fn from(record: LogRecord) -> Self {
        Self {
            hash: record.hash,
            author: record.author,
            created: record.pushed_at,
            sequence: record.sequence,
            tags: non_empty(record.tags),
            versions: non_empty(record.versions),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<TagItem>,
}

#[derive(Debug, Serialize)]
pub struct TagItem {
    pub tag: String,
    pub hash: ContentHash,
}

impl From<Tag> for TagItem {
    fn from(tag: Tag) -> Self {
        Self {
            tag: tag.name,
            hash: tag.hash,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionItem>,
}

#[derive(Debug, Serialize)]
pub struct VersionItem {
    pub version: String,
    pub hash: ContentHash,
}

impl From<Version> for VersionItem {
    fn from(version: Version) -> Self {
        Self {
            version: version.version,
            hash: version.hash,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SharesResponse {
    pub users: Vec<Grantee>,
}
