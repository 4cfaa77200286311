//! Externally visible package history
//!
//! Joins the push log with the tag and version namespaces. The join runs over
//! a [`LogSnapshot`] read in one transaction, so a record never shows a tag
//! that was moved between two reads.

use cairn::ContentHash;
use std::collections::{BTreeSet, HashMap};

use crate::entities::{LogRecord, LogSnapshot};
use crate::error::{RegistryError, Result};
use crate::reference::PackageRef;

fn integrity_fault(package: &PackageRef, kind: &str, name: &str, hash: &ContentHash) -> RegistryError {
    tracing::error!(%package, kind, name, %hash, "dangling reference in package history");
    RegistryError::Integrity(format!(
        "{} '{}' of {} points at missing instance {}",
        kind, name, package, hash
    ))
}

/// Build log records in the snapshot's sequence order.
///
/// Every log entry, tag and version must reference a stored instance of the
/// package; anything else is reported as an integrity fault. A tag or version
/// on an instance that was stored but never logged shows up on no record.
pub fn build_log(package: &PackageRef, snapshot: LogSnapshot) -> Result<Vec<LogRecord>> {
    let LogSnapshot {
        entries,
        tags,
        versions,
        instances,
    } = snapshot;

    if let Some(entry) = entries.iter().find(|e| !instances.contains(&e.hash)) {
        return Err(integrity_fault(
            package,
            "log entry",
            &entry.sequence.to_string(),
            &entry.hash,
        ));
    }

    let mut tags_by_hash: HashMap<ContentHash, BTreeSet<String>> = HashMap::new();
    for tag in tags {
        if !instances.contains(&tag.hash) {
            return Err(integrity_fault(package, "tag", &tag.name, &tag.hash));
        }
        tags_by_hash.entry(tag.hash).or_default().insert(tag.name);
    }

    let mut versions_by_hash: HashMap<ContentHash, BTreeSet<String>> = HashMap::new();
    for version in versions {
        if !instances.contains(&version.hash) {
            return Err(integrity_fault(
                package,
                "version",
                &version.version,
                &version.hash,
            ));
        }
        versions_by_hash
            .entry(version.hash)
            .or_default()
            .insert(version.version);
    }

    let names = |index: &HashMap<ContentHash, BTreeSet<String>>, hash: &ContentHash| {
        index
            .get(hash)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    };

    Ok(entries
        .into_iter()
        .map(|entry| LogRecord {
            sequence: entry.sequence,
            tags: names(&tags_by_hash, &entry.hash),
            versions: names(&versions_by_hash, &entry.hash),
            hash: entry.hash,
            author: entry.author,
            pushed_at: entry.pushed_at,
        })
        .collect())
}
