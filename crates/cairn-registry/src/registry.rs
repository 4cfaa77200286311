//! High-level registry interface for package management

use cairn::{ContentHash, PackageTree, hash_tree};
use std::sync::Arc;

use crate::access::{AccessGate, Grantee, Viewer};
use crate::entities::{LogRecord, NewPush, PushLogEntry, StoredInstance, Tag, Version};
use crate::error::{RegistryError, Result};
use crate::log_view::build_log;
use crate::reference::{PackageRef, validate_identity, validate_tag, validate_version};
use crate::storage::RegistryStore;

/// Package registry backed by any [`RegistryStore`]
///
/// Writes trust the caller to have checked ownership. Reads take a [`Viewer`]
/// and pass through the access gate before touching any data.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn RegistryStore>,
}

impl Registry {
    /// Create a new registry with the given storage backend
    pub fn new<S: RegistryStore + 'static>(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    async fn gate(&self, package: &PackageRef, viewer: &Viewer) -> Result<()> {
        AccessGate::new(self.store.as_ref())
            .check(package, viewer)
            .await
            .map(|_| ())
    }

    // === Writes ===

    /// Push a tree as a new instance of `package`
    ///
    /// Identical content pushed again reuses the stored instance but still
    /// appends a log entry.
    pub async fn push(
        &self,
        package: &PackageRef,
        tree: PackageTree,
        author: &str,
        tag_latest: bool,
    ) -> Result<PushLogEntry> {
        validate_identity(author)?;
        let hash = hash_tree(&tree)?;

        let entry = self
            .store
            .commit_push(NewPush {
                package: package.clone(),
                hash,
                tree,
                author: author.to_string(),
                tag_latest,
            })
            .await?;

        tracing::info!(
            %package,
            %hash,
            sequence = entry.sequence,
            author,
            tag_latest,
            "pushed instance"
        );
        Ok(entry)
    }

    /// Bind `version` to `hash`; versions never move once assigned
    pub async fn assign_version(
        &self,
        package: &PackageRef,
        version: &str,
        hash: &ContentHash,
    ) -> Result<()> {
        validate_version(version)?;
        self.store.set_version(package, version, hash).await?;

        tracing::info!(%package, version, %hash, "assigned version");
        Ok(())
    }

    pub async fn set_tag(&self, package: &PackageRef, tag: &str, hash: &ContentHash) -> Result<()> {
        validate_tag(tag)?;
        self.store.set_tag(package, tag, hash).await?;

        tracing::info!(%package, tag, %hash, "moved tag");
        Ok(())
    }

    pub async fn remove_tag(&self, package: &PackageRef, tag: &str) -> Result<()> {
        if !self.store.remove_tag(package, tag).await? {
            return Err(RegistryError::TagNotFound {
                package: package.clone(),
                tag: tag.to_string(),
            });
        }

        tracing::info!(%package, tag, "removed tag");
        Ok(())
    }

    /// Let `grantee` read the package
    pub async fn grant_share(&self, package: &PackageRef, grantee: &Grantee) -> Result<()> {
        if let Grantee::User(identity) = grantee {
            validate_identity(identity)?;
        }
        self.store.add_grant(package, grantee).await?;

        tracing::info!(%package, %grantee, "granted access");
        Ok(())
    }

    pub async fn revoke_share(&self, package: &PackageRef, grantee: &Grantee) -> Result<()> {
        if !self.store.remove_grant(package, grantee).await? {
            return Err(RegistryError::ShareNotFound {
                package: package.clone(),
                grantee: grantee.to_string(),
            });
        }

        tracing::info!(%package, %grantee, "revoked access");
        Ok(())
    }

    // === Gated reads ===

    /// Push history, oldest first, annotated with current tags and versions
    pub async fn get_log(&self, package: &PackageRef, viewer: &Viewer) -> Result<Vec<LogRecord>> {
        self.gate(package, viewer).await?;
        let snapshot = self.store.log_snapshot(package).await?;
        build_log(package, snapshot)
    }

    pub async fn get_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        viewer: &Viewer,
    ) -> Result<StoredInstance> {
        self.gate(package, viewer).await?;
        self.store
            .get_instance(package, hash)
            .await?
            .ok_or_else(|| RegistryError::InstanceNotFound {
                package: package.clone(),
                hash: *hash,
            })
    }

    pub async fn resolve_tag(
        &self,
        package: &PackageRef,
        tag: &str,
        viewer: &Viewer,
    ) -> Result<ContentHash> {
        self.gate(package, viewer).await?;
        self.store
            .resolve_tag(package, tag)
            .await?
            .ok_or_else(|| RegistryError::TagNotFound {
                package: package.clone(),
                tag: tag.to_string(),
            })
    }

    pub async fn resolve_version(
        &self,
        package: &PackageRef,
        version: &str,
        viewer: &Viewer,
    ) -> Result<ContentHash> {
        self.gate(package, viewer).await?;
        self.store
            .resolve_version(package, version)
            .await?
            .ok_or_else(|| RegistryError::VersionNotFound {
                package: package.clone(),
                version: version.to_string(),
            })
    }

    pub async fn list_tags(&self, package: &PackageRef, viewer: &Viewer) -> Result<Vec<Tag>> {
        self.gate(package, viewer).await?;
        self.store.list_tags(package).await
    }

    pub async fn list_versions(&self, package: &PackageRef, viewer: &Viewer) -> Result<Vec<Version>> {
        self.gate(package, viewer).await?;
        self.store.list_versions(package).await
    }

    pub async fn list_shares(&self, package: &PackageRef, viewer: &Viewer) -> Result<Vec<Grantee>> {
        self.gate(package, viewer).await?;
        self.store
            .package_grants(package)
            .await?
            .ok_or_else(|| RegistryError::PackageNotFound(package.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use cairn::Leaf;

    fn pkg() -> PackageRef {
        PackageRef::new("alice", "pkg").unwrap()
    }

    fn tree(digest: &str) -> PackageTree {
        let mut tree = PackageTree::new();
        tree.insert_leaf(tree.root(), "data", Leaf::new([digest]))
            .unwrap();
        tree
    }

    #[tokio::test]
    async fn test_push_rejects_malformed_tree() {
        let registry = Registry::new(MemoryStore::new());
        let mut looped = PackageTree::new();
        let root = looped.root();
        looped.attach(root, "me", root).unwrap();

        let result = registry.push(&pkg(), looped, "alice", true).await;
        assert!(matches!(result, Err(RegistryError::MalformedInput(_))));
        assert!(matches!(
            registry.get_log(&pkg(), &Viewer::user("alice")).await,
            Err(RegistryError::PackageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repush_reuses_instance() {
        let registry = Registry::new(MemoryStore::new());

        let first = registry.push(&pkg(), tree("aa"), "alice", true).await.unwrap();
        let second = registry.push(&pkg(), tree("aa"), "alice", true).await.unwrap();

        assert_eq!(first.hash, second.hash);
        assert_eq!((first.sequence, second.sequence), (1, 2));

        let log = registry.get_log(&pkg(), &Viewer::user("alice")).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].tags, vec!["latest"]);
        assert_eq!(log[1].tags, vec!["latest"]);
    }

    #[tokio::test]
    async fn test_remove_missing_tag() {
        let registry = Registry::new(MemoryStore::new());
        registry.push(&pkg(), tree("aa"), "alice", false).await.unwrap();

        assert!(matches!(
            registry.remove_tag(&pkg(), "latest").await,
            Err(RegistryError::TagNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let registry = Registry::new(MemoryStore::new());
        let entry = registry.push(&pkg(), tree("aa"), "alice", false).await.unwrap();

        assert!(matches!(
            registry.assign_version(&pkg(), "-1", &entry.hash).await,
            Err(RegistryError::InvalidReference(_))
        ));
        assert!(matches!(
            registry.set_tag(&pkg(), "", &entry.hash).await,
            Err(RegistryError::InvalidReference(_))
        ));
        assert!(matches!(
            registry.push(&pkg(), tree("bb"), "public", false).await,
            Err(RegistryError::InvalidReference(_))
        ));
    }
}
