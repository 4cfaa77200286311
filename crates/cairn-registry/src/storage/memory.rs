//! In-memory storage backend
//!
//! Each package owns its own mutex, so every trait method runs as a
//! serializable transaction on that package while unrelated packages proceed
//! in parallel. The outer map lock is only held to look up or create a
//! package. Used for tests, development and the server when no database is
//! configured.

use async_trait::async_trait;
use cairn::{ContentHash, PackageTree};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

use super::{GrantStore, InstanceStore, PushLog, RegistryStore, TagRegistry, VersionRegistry};
use crate::access::Grantee;
use crate::entities::{LogSnapshot, NewPush, PushLogEntry, StoredInstance, Tag, Version};
use crate::error::{RegistryError, Result};
use crate::reference::{LATEST_TAG, PackageRef};

#[derive(Debug, Default)]
struct PackageState {
    /// Last sequence handed out; the next push gets `last_sequence + 1`
    last_sequence: u64,
    instances: HashMap<ContentHash, StoredInstance>,
    log: Vec<PushLogEntry>,
    tags: BTreeMap<String, ContentHash>,
    versions: BTreeMap<String, ContentHash>,
    grants: BTreeSet<Grantee>,
}

impl PackageState {
    fn insert_instance(&mut self, hash: &ContentHash, tree: &PackageTree, author: &str) -> bool {
        if self.instances.contains_key(hash) {
            return false;
        }
        self.instances.insert(
            *hash,
            StoredInstance {
                hash: *hash,
                tree: tree.clone(),
                author: author.to_string(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        true
    }

    fn append(&mut self, package: &PackageRef, hash: &ContentHash, author: &str) -> PushLogEntry {
        self.last_sequence += 1;
        let entry = PushLogEntry::new(
            package.clone(),
            self.last_sequence,
            *hash,
            author.to_string(),
        );
        self.log.push(entry.clone());
        entry
    }

    fn require_instance(&self, package: &PackageRef, hash: &ContentHash) -> Result<()> {
        if self.instances.contains_key(hash) {
            Ok(())
        } else {
            Err(instance_not_found(package, hash))
        }
    }

    fn tag_list(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(name, hash)| Tag {
                name: name.clone(),
                hash: *hash,
            })
            .collect()
    }

    fn version_list(&self) -> Vec<Version> {
        self.versions
            .iter()
            .map(|(version, hash)| Version {
                version: version.clone(),
                hash: *hash,
            })
            .collect()
    }
}

type Shard = Arc<Mutex<PackageState>>;

fn lock_state(shard: &Shard) -> Result<MutexGuard<'_, PackageState>> {
    shard
        .lock()
        .map_err(|_| RegistryError::Storage("Lock poisoned".into()))
}

/// In-memory registry storage for testing and development
#[derive(Debug, Default)]
pub struct MemoryStore {
    packages: Mutex<HashMap<PackageRef, Shard>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of packages with at least one instance (useful for testing)
    pub fn package_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<PackageRef, Shard>>> {
        self.packages
            .lock()
            .map_err(|_| RegistryError::Storage("Lock poisoned".into()))
    }

    fn shard(&self, package: &PackageRef) -> Result<Option<Shard>> {
        Ok(self.lock()?.get(package).cloned())
    }

    fn shard_or_create(&self, package: &PackageRef) -> Result<Shard> {
        Ok(self.lock()?.entry(package.clone()).or_default().clone())
    }
}

fn instance_not_found(package: &PackageRef, hash: &ContentHash) -> RegistryError {
    RegistryError::InstanceNotFound {
        package: package.clone(),
        hash: *hash,
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn put_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        tree: &PackageTree,
        author: &str,
    ) -> Result<bool> {
        let shard = self.shard_or_create(package)?;
        let mut state = lock_state(&shard)?;
        Ok(state.insert_instance(hash, tree, author))
    }

    async fn get_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
    ) -> Result<Option<StoredInstance>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(None);
        };
        let state = lock_state(&shard)?;
        Ok(state.instances.get(hash).cloned())
    }
}

#[async_trait]
impl PushLog for MemoryStore {
    async fn append(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        author: &str,
    ) -> Result<PushLogEntry> {
        let shard = self
            .shard(package)?
            .ok_or_else(|| instance_not_found(package, hash))?;
        let mut state = lock_state(&shard)?;
        state.require_instance(package, hash)?;
        Ok(state.append(package, hash, author))
    }

    async fn list_log(&self, package: &PackageRef) -> Result<Vec<PushLogEntry>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(Vec::new());
        };
        let state = lock_state(&shard)?;
        Ok(state.log.clone())
    }
}

#[async_trait]
impl TagRegistry for MemoryStore {
    async fn set_tag(&self, package: &PackageRef, tag: &str, hash: &ContentHash) -> Result<()> {
        let shard = self
            .shard(package)?
            .ok_or_else(|| instance_not_found(package, hash))?;
        let mut state = lock_state(&shard)?;
        state.require_instance(package, hash)?;
        state.tags.insert(tag.to_string(), *hash);
        Ok(())
    }

    async fn resolve_tag(&self, package: &PackageRef, tag: &str) -> Result<Option<ContentHash>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(None);
        };
        let state = lock_state(&shard)?;
        Ok(state.tags.get(tag).copied())
    }

    async fn remove_tag(&self, package: &PackageRef, tag: &str) -> Result<bool> {
        let Some(shard) = self.shard(package)? else {
            return Ok(false);
        };
        let mut state = lock_state(&shard)?;
        Ok(state.tags.remove(tag).is_some())
    }

    async fn list_tags(&self, package: &PackageRef) -> Result<Vec<Tag>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(Vec::new());
        };
        let state = lock_state(&shard)?;
        Ok(state.tag_list())
    }
}

#[async_trait]
impl VersionRegistry for MemoryStore {
    async fn set_version(
        &self,
        package: &PackageRef,
        version: &str,
        hash: &ContentHash,
    ) -> Result<()> {
        let shard = self
            .shard(package)?
            .ok_or_else(|| instance_not_found(package, hash))?;
        let mut state = lock_state(&shard)?;
        state.require_instance(package, hash)?;

        match state.versions.get(version) {
            Some(existing) if existing == hash => Ok(()),
            Some(existing) => Err(RegistryError::VersionConflict {
                package: package.clone(),
                version: version.to_string(),
                existing: *existing,
                requested: *hash,
            }),
            None => {
                state.versions.insert(version.to_string(), *hash);
                Ok(())
            }
        }
    }

    async fn resolve_version(
        &self,
        package: &PackageRef,
        version: &str,
    ) -> Result<Option<ContentHash>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(None);
        };
        let state = lock_state(&shard)?;
        Ok(state.versions.get(version).copied())
    }

    async fn list_versions(&self, package: &PackageRef) -> Result<Vec<Version>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(Vec::new());
        };
        let state = lock_state(&shard)?;
        Ok(state.version_list())
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn package_grants(&self, package: &PackageRef) -> Result<Option<Vec<Grantee>>> {
        let Some(shard) = self.shard(package)? else {
            return Ok(None);
        };
        let state = lock_state(&shard)?;
        Ok(Some(state.grants.iter().cloned().collect()))
    }

    async fn add_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<()> {
        let shard = self
            .shard(package)?
            .ok_or_else(|| RegistryError::PackageNotFound(package.clone()))?;
        let mut state = lock_state(&shard)?;
        state.grants.insert(grantee.clone());
        Ok(())
    }

    async fn remove_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<bool> {
        let Some(shard) = self.shard(package)? else {
            return Ok(false);
        };
        let mut state = lock_state(&shard)?;
        Ok(state.grants.remove(grantee))
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn commit_push(&self, push: NewPush) -> Result<PushLogEntry> {
        let shard = self.shard_or_create(&push.package)?;
        let mut state = lock_state(&shard)?;

        state.insert_instance(&push.hash, &push.tree, &push.author);
        let entry = state.append(&push.package, &push.hash, &push.author);
        if push.tag_latest {
            state.tags.insert(LATEST_TAG.to_string(), push.hash);
        }

        Ok(entry)
    }

    async fn log_snapshot(&self, package: &PackageRef) -> Result<LogSnapshot> {
        let Some(shard) = self.shard(package)? else {
            return Ok(LogSnapshot::default());
        };
        let state = lock_state(&shard)?;

        Ok(LogSnapshot {
            entries: state.log.clone(),
            tags: state.tag_list(),
            versions: state.version_list(),
            instances: state.instances.keys().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> PackageRef {
        PackageRef::new("alice", "pkg").unwrap()
    }

    fn tree_and_hash(name: &str) -> (PackageTree, ContentHash) {
        let mut tree = PackageTree::new();
        tree.insert_group(tree.root(), name).unwrap();
        let hash = cairn::hash_tree(&tree).unwrap();
        (tree, hash)
    }

    #[tokio::test]
    async fn test_put_instance_is_idempotent() {
        let store = MemoryStore::new();
        let (tree, hash) = tree_and_hash("foo");

        assert!(store.put_instance(&pkg(), &hash, &tree, "alice").await.unwrap());
        assert!(!store.put_instance(&pkg(), &hash, &tree, "bob").await.unwrap());

        let stored = store.get_instance(&pkg(), &hash).await.unwrap().unwrap();
        assert_eq!(stored.author, "alice");
        assert_eq!(store.package_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_requires_instance() {
        let store = MemoryStore::new();
        let (tree, hash) = tree_and_hash("foo");
        let (_, missing) = tree_and_hash("bar");

        store.put_instance(&pkg(), &hash, &tree, "alice").await.unwrap();
        let first = store.append(&pkg(), &hash, "alice").await.unwrap();
        let second = store.append(&pkg(), &hash, "alice").await.unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));

        assert!(matches!(
            store.append(&pkg(), &missing, "alice").await,
            Err(RegistryError::InstanceNotFound { .. })
        ));
        assert_eq!(store.list_log(&pkg()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_instances_are_scoped_to_package() {
        let store = MemoryStore::new();
        let other = PackageRef::new("alice", "other").unwrap();
        let (tree, hash) = tree_and_hash("foo");

        store.put_instance(&other, &hash, &tree, "alice").await.unwrap();

        assert!(store.set_tag(&other, "stable", &hash).await.is_ok());
        assert!(matches!(
            store.set_tag(&pkg(), "stable", &hash).await,
            Err(RegistryError::InstanceNotFound { .. })
        ));
        assert_eq!(store.resolve_tag(&pkg(), "stable").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_packages_are_locked_independently() {
        let store = MemoryStore::new();
        let (tree, hash) = tree_and_hash("foo");
        let other = PackageRef::new("bob", "pkg").unwrap();
        store.put_instance(&pkg(), &hash, &tree, "alice").await.unwrap();
        store.put_instance(&other, &hash, &tree, "bob").await.unwrap();

        // alice/pkg stays locked while bob/pkg is written
        let shard = store.shard(&pkg()).unwrap().unwrap();
        let guard = lock_state(&shard).unwrap();
        assert!(store.shard(&other).unwrap().unwrap().try_lock().is_ok());

        let entry = store.append(&other, &hash, "bob").await.unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(guard.log.len(), 0);
        drop(guard);

        assert_eq!(store.list_log(&pkg()).await.unwrap().len(), 0);
        assert_eq!(store.package_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_grant_requires_package() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.add_grant(&pkg(), &Grantee::Public).await,
            Err(RegistryError::PackageNotFound(_))
        ));
        assert_eq!(store.package_grants(&pkg()).await.unwrap(), None);
    }
}
