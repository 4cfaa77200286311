//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the registry storage
//! traits. Tables carry foreign keys from tags, versions and the push log onto
//! instances, so a dangling reference is rejected by the database as well as by
//! the queries below.
//!
//! Write transactions always start with a write statement. SQLite then takes
//! the write lock before anything is read, and concurrent writers queue on the
//! busy timeout instead of failing on a stale snapshot.

use async_trait::async_trait;
use cairn::{ContentHash, PackageTree};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{GrantStore, InstanceStore, PushLog, RegistryStore, TagRegistry, VersionRegistry};
use crate::access::Grantee;
use crate::entities::{LogSnapshot, NewPush, PushLogEntry, StoredInstance, Tag, Version};
use crate::error::{RegistryError, Result};
use crate::reference::{LATEST_TAG, PackageRef};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based registry storage
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url` and initialize the schema
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| RegistryError::Storage(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to connect to SQLite: {}", e)))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create SQLite storage from environment variable
    ///
    /// Expects DATABASE_URL environment variable with SQLite connection string
    /// Example: sqlite:./data/cairn.db
    pub async fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./data/cairn.db".to_string());

        Self::new(&database_url).await
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS packages (
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                next_sequence INTEGER NOT NULL DEFAULT 0,  -- last sequence handed out
                created_at INTEGER NOT NULL,               -- unix nanos
                PRIMARY KEY (owner, package)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS instances (
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                hash TEXT NOT NULL,
                tree TEXT NOT NULL,                        -- JSON
                author TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (owner, package, hash),
                FOREIGN KEY (owner, package) REFERENCES packages (owner, package)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS push_log (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                hash TEXT NOT NULL,
                author TEXT NOT NULL,
                pushed_at INTEGER NOT NULL,
                UNIQUE (owner, package, sequence),
                FOREIGN KEY (owner, package, hash) REFERENCES instances (owner, package, hash)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                tag TEXT NOT NULL,
                hash TEXT NOT NULL,
                PRIMARY KEY (owner, package, tag),
                FOREIGN KEY (owner, package, hash) REFERENCES instances (owner, package, hash)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                version TEXT NOT NULL,
                hash TEXT NOT NULL,
                PRIMARY KEY (owner, package, version),
                FOREIGN KEY (owner, package, hash) REFERENCES instances (owner, package, hash)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS grants (
                owner TEXT NOT NULL,
                package TEXT NOT NULL,
                grantee TEXT NOT NULL,
                PRIMARY KEY (owner, package, grantee),
                FOREIGN KEY (owner, package) REFERENCES packages (owner, package)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_push_log_hash ON push_log (owner, package, hash)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to initialize schema", e))?;
        }

        Ok(())
    }

    async fn version_target(
        &self,
        package: &PackageRef,
        version: &str,
    ) -> Result<Option<ContentHash>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT hash FROM versions WHERE owner = ? AND package = ? AND version = ?",
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to resolve version", e))?;

        hash.as_deref().map(parse_hash).transpose()
    }

    async fn instance_exists(&self, package: &PackageRef, hash: &ContentHash) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM instances WHERE owner = ? AND package = ? AND hash = ?",
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(hash.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to look up instance", e))?;

        Ok(found.is_some())
    }
}

fn storage_error(context: &str, error: sqlx::Error) -> RegistryError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_foreign_key_violation() {
            tracing::error!(%error, "{}: foreign key violation", context);
            return RegistryError::Integrity(format!("{}: {}", context, error));
        }
    }
    RegistryError::Storage(format!("{}: {}", context, error))
}

fn parse_hash(value: &str) -> Result<ContentHash> {
    value
        .parse()
        .map_err(|e| RegistryError::Storage(format!("Invalid hash '{}' in database: {}", value, e)))
}

fn to_nanos(timestamp: OffsetDateTime) -> i64 {
    // i64 nanoseconds cover timestamps until the year 2262
    timestamp.unix_timestamp_nanos() as i64
}

fn from_nanos(nanos: i64) -> Result<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))?)
}

fn entry_from_row(package: &PackageRef, row: &sqlx::sqlite::SqliteRow) -> Result<PushLogEntry> {
    let id: String = row.get("id");
    let sequence: i64 = row.get("sequence");
    let hash: String = row.get("hash");

    Ok(PushLogEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| RegistryError::Storage(format!("Invalid push id '{}': {}", id, e)))?,
        package: package.clone(),
        sequence: sequence as u64,
        hash: parse_hash(&hash)?,
        author: row.get("author"),
        pushed_at: from_nanos(row.get("pushed_at"))?,
    })
}

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    let hash: String = row.get("hash");
    Ok(Tag {
        name: row.get("tag"),
        hash: parse_hash(&hash)?,
    })
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Version> {
    let hash: String = row.get("hash");
    Ok(Version {
        version: row.get("version"),
        hash: parse_hash(&hash)?,
    })
}

const ENSURE_PACKAGE: &str = r#"
    INSERT INTO packages (owner, package, next_sequence, created_at)
    VALUES (?, ?, 0, ?)
    ON CONFLICT (owner, package) DO NOTHING
"#;

const NEXT_SEQUENCE: &str = r#"
    UPDATE packages SET next_sequence = next_sequence + 1
    WHERE owner = ? AND package = ?
    RETURNING next_sequence
"#;

const INSERT_INSTANCE: &str = r#"
    INSERT INTO instances (owner, package, hash, tree, author, created_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT (owner, package, hash) DO NOTHING
"#;

const INSERT_LOG_ENTRY: &str = r#"
    INSERT INTO push_log (id, owner, package, sequence, hash, author, pushed_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const UPSERT_TAG: &str = r#"
    INSERT INTO tags (owner, package, tag, hash)
    SELECT ?1, ?2, ?3, ?4
    WHERE EXISTS (
        SELECT 1 FROM instances WHERE owner = ?1 AND package = ?2 AND hash = ?4
    )
    ON CONFLICT (owner, package, tag) DO UPDATE SET hash = excluded.hash
"#;

#[async_trait]
impl InstanceStore for SqliteStore {
    async fn put_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        tree: &PackageTree,
        author: &str,
    ) -> Result<bool> {
        let tree_json = serde_json::to_string(tree)?;
        let now = to_nanos(OffsetDateTime::now_utc());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        sqlx::query(ENSURE_PACKAGE)
            .bind(package.owner())
            .bind(package.name())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to create package", e))?;

        let inserted = sqlx::query(INSERT_INSTANCE)
            .bind(package.owner())
            .bind(package.name())
            .bind(hash.to_string())
            .bind(tree_json)
            .bind(author)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to store instance", e))?
            .rows_affected()
            == 1;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit instance", e))?;

        Ok(inserted)
    }

    async fn get_instance(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
    ) -> Result<Option<StoredInstance>> {
        let row = sqlx::query(
            r#"
            SELECT tree, author, created_at FROM instances
            WHERE owner = ? AND package = ? AND hash = ?
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(hash.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to get instance", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tree_json: String = row.get("tree");
        Ok(Some(StoredInstance {
            hash: *hash,
            tree: serde_json::from_str(&tree_json)?,
            author: row.get("author"),
            created_at: from_nanos(row.get("created_at"))?,
        }))
    }
}

#[async_trait]
impl PushLog for SqliteStore {
    async fn append(
        &self,
        package: &PackageRef,
        hash: &ContentHash,
        author: &str,
    ) -> Result<PushLogEntry> {
        let not_found = || RegistryError::InstanceNotFound {
            package: package.clone(),
            hash: *hash,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let sequence: Option<i64> = sqlx::query_scalar(NEXT_SEQUENCE)
            .bind(package.owner())
            .bind(package.name())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to assign sequence", e))?;
        // Dropping the transaction rolls back the increment
        let sequence = sequence.ok_or_else(not_found)?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM instances WHERE owner = ? AND package = ? AND hash = ?",
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(hash.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to look up instance", e))?;
        if exists.is_none() {
            return Err(not_found());
        }

        let entry = PushLogEntry::new(package.clone(), sequence as u64, *hash, author.to_string());
        sqlx::query(INSERT_LOG_ENTRY)
            .bind(entry.id.to_string())
            .bind(package.owner())
            .bind(package.name())
            .bind(sequence)
            .bind(hash.to_string())
            .bind(author)
            .bind(to_nanos(entry.pushed_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to append log entry", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit log entry", e))?;

        Ok(entry)
    }

    async fn list_log(&self, package: &PackageRef) -> Result<Vec<PushLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, hash, author, pushed_at FROM push_log
            WHERE owner = ? AND package = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list log", e))?;

        rows.iter().map(|row| entry_from_row(package, row)).collect()
    }
}

#[async_trait]
impl TagRegistry for SqliteStore {
    async fn set_tag(&self, package: &PackageRef, tag: &str, hash: &ContentHash) -> Result<()> {
        let result = sqlx::query(UPSERT_TAG)
            .bind(package.owner())
            .bind(package.name())
            .bind(tag)
            .bind(hash.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to set tag", e))?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::InstanceNotFound {
                package: package.clone(),
                hash: *hash,
            });
        }
        Ok(())
    }

    async fn resolve_tag(&self, package: &PackageRef, tag: &str) -> Result<Option<ContentHash>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT hash FROM tags WHERE owner = ? AND package = ? AND tag = ?",
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to resolve tag", e))?;

        hash.as_deref().map(parse_hash).transpose()
    }

    async fn remove_tag(&self, package: &PackageRef, tag: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE owner = ? AND package = ? AND tag = ?")
            .bind(package.owner())
            .bind(package.name())
            .bind(tag)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to remove tag", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self, package: &PackageRef) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT tag, hash FROM tags WHERE owner = ? AND package = ? ORDER BY tag ASC",
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list tags", e))?;

        rows.iter().map(tag_from_row).collect()
    }
}

#[async_trait]
impl VersionRegistry for SqliteStore {
    async fn set_version(
        &self,
        package: &PackageRef,
        version: &str,
        hash: &ContentHash,
    ) -> Result<()> {
        // Insert-if-absent in one statement; losers of a race see the winner's row
        let result = sqlx::query(
            r#"
            INSERT INTO versions (owner, package, version, hash)
            SELECT ?1, ?2, ?3, ?4
            WHERE EXISTS (
                SELECT 1 FROM instances WHERE owner = ?1 AND package = ?2 AND hash = ?4
            )
            ON CONFLICT (owner, package, version) DO NOTHING
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(version)
        .bind(hash.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to assign version", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.version_target(package, version).await? {
            Some(existing) if existing == *hash => Ok(()),
            Some(existing) => Err(RegistryError::VersionConflict {
                package: package.clone(),
                version: version.to_string(),
                existing,
                requested: *hash,
            }),
            None if !self.instance_exists(package, hash).await? => {
                Err(RegistryError::InstanceNotFound {
                    package: package.clone(),
                    hash: *hash,
                })
            }
            None => Err(RegistryError::Storage(format!(
                "Version '{}' of {} was neither inserted nor found",
                version, package
            ))),
        }
    }

    async fn resolve_version(
        &self,
        package: &PackageRef,
        version: &str,
    ) -> Result<Option<ContentHash>> {
        self.version_target(package, version).await
    }

    async fn list_versions(&self, package: &PackageRef) -> Result<Vec<Version>> {
        let rows = sqlx::query(
            r#"
            SELECT version, hash FROM versions
            WHERE owner = ? AND package = ?
            ORDER BY version ASC
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list versions", e))?;

        rows.iter().map(version_from_row).collect()
    }
}

#[async_trait]
impl GrantStore for SqliteStore {
    async fn package_grants(&self, package: &PackageRef) -> Result<Option<Vec<Grantee>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM packages WHERE owner = ? AND package = ?")
                .bind(package.owner())
                .bind(package.name())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to look up package", e))?;
        if exists.is_none() {
            return Ok(None);
        }

        let grantees: Vec<String> = sqlx::query_scalar(
            "SELECT grantee FROM grants WHERE owner = ? AND package = ? ORDER BY grantee ASC",
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to list grants", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to finish read", e))?;

        Ok(Some(grantees.into_iter().map(Grantee::from).collect()))
    }

    async fn add_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO grants (owner, package, grantee)
            SELECT ?1, ?2, ?3
            WHERE EXISTS (SELECT 1 FROM packages WHERE owner = ?1 AND package = ?2)
            ON CONFLICT (owner, package, grantee) DO NOTHING
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .bind(grantee.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to add grant", e))?;

        if result.rows_affected() == 0 && self.package_grants(package).await?.is_none() {
            return Err(RegistryError::PackageNotFound(package.clone()));
        }
        Ok(())
    }

    async fn remove_grant(&self, package: &PackageRef, grantee: &Grantee) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM grants WHERE owner = ? AND package = ? AND grantee = ?")
                .bind(package.owner())
                .bind(package.name())
                .bind(grantee.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to remove grant", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn commit_push(&self, push: NewPush) -> Result<PushLogEntry> {
        let tree_json = serde_json::to_string(&push.tree)?;
        let package = &push.package;
        let hash = push.hash.to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        sqlx::query(ENSURE_PACKAGE)
            .bind(package.owner())
            .bind(package.name())
            .bind(to_nanos(OffsetDateTime::now_utc()))
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to create package", e))?;

        let sequence: i64 = sqlx::query_scalar(NEXT_SEQUENCE)
            .bind(package.owner())
            .bind(package.name())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to assign sequence", e))?;

        let entry = PushLogEntry::new(
            package.clone(),
            sequence as u64,
            push.hash,
            push.author.clone(),
        );

        sqlx::query(INSERT_INSTANCE)
            .bind(package.owner())
            .bind(package.name())
            .bind(&hash)
            .bind(tree_json)
            .bind(&push.author)
            .bind(to_nanos(entry.pushed_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to store instance", e))?;

        sqlx::query(INSERT_LOG_ENTRY)
            .bind(entry.id.to_string())
            .bind(package.owner())
            .bind(package.name())
            .bind(sequence)
            .bind(&hash)
            .bind(&push.author)
            .bind(to_nanos(entry.pushed_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to append log entry", e))?;

        if push.tag_latest {
            sqlx::query(UPSERT_TAG)
                .bind(package.owner())
                .bind(package.name())
                .bind(LATEST_TAG)
                .bind(&hash)
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to tag latest", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit push", e))?;

        Ok(entry)
    }

    async fn log_snapshot(&self, package: &PackageRef) -> Result<LogSnapshot> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        let entry_rows = sqlx::query(
            r#"
            SELECT id, sequence, hash, author, pushed_at FROM push_log
            WHERE owner = ? AND package = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to read log", e))?;

        let tag_rows = sqlx::query(
            "SELECT tag, hash FROM tags WHERE owner = ? AND package = ? ORDER BY tag ASC",
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to read tags", e))?;

        let version_rows = sqlx::query(
            "SELECT version, hash FROM versions WHERE owner = ? AND package = ? ORDER BY version ASC",
        )
        .bind(package.owner())
        .bind(package.name())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to read versions", e))?;

        let instance_hashes: Vec<String> =
            sqlx::query_scalar("SELECT hash FROM instances WHERE owner = ? AND package = ?")
                .bind(package.owner())
                .bind(package.name())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to read instances", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to finish read", e))?;

        Ok(LogSnapshot {
            entries: entry_rows
                .iter()
                .map(|row| entry_from_row(package, row))
                .collect::<Result<_>>()?,
            tags: tag_rows.iter().map(tag_from_row).collect::<Result<_>>()?,
            versions: version_rows
                .iter()
                .map(version_from_row)
                .collect::<Result<_>>()?,
            instances: instance_hashes
                .iter()
                .map(|h| parse_hash(h))
                .collect::<Result<HashSet<_>>>()?,
        })
    }
}
