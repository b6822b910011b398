//! SQLite entry store.
//!
//! Entries live in two tables:
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `acl_entries` | one row per entry; UNIQUE on the entry tuple |
//! | `acl_entry_permissions` | one row per (entry, permission) |
//!
//! Get-or-create relies on the unique constraint
//! (`INSERT .. ON CONFLICT DO NOTHING` followed by a select), so concurrent
//! writers never produce duplicate entries.
//!
//! # Feature Gate
//!
//! This module requires the `acl-sqlite` feature.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{AclError, Result};
use crate::permission::{Permission, PermissionCatalog};
use crate::store::EntryStore;
use crate::types::{Entry, EntryId, EntryKey, ResourceKey, SubjectRef};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS acl_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_type TEXT NOT NULL,
        resource_name TEXT NOT NULL,
        subject_namespace TEXT NOT NULL,
        subject_identifier TEXT NOT NULL,
        mode TEXT NOT NULL,
        deny INTEGER NOT NULL,
        sort_key INTEGER NOT NULL DEFAULT 0,
        UNIQUE (resource_type, resource_name, subject_namespace, subject_identifier, mode, deny)
    )",
    "CREATE TABLE IF NOT EXISTS acl_entry_permissions (
        entry_id INTEGER NOT NULL REFERENCES acl_entries (id) ON DELETE CASCADE,
        permission TEXT NOT NULL,
        PRIMARY KEY (entry_id, permission)
    )",
    "CREATE INDEX IF NOT EXISTS acl_entries_by_resource
        ON acl_entries (resource_type, resource_name, deny, sort_key)",
];

const SELECT_ENTRY: &str = "SELECT e.id, e.resource_type, e.resource_name, e.subject_namespace,
        e.subject_identifier, e.mode, e.deny, e.sort_key, p.permission
    FROM acl_entries e
    LEFT JOIN acl_entry_permissions p ON p.entry_id = e.id";

/// One joined row: entry columns plus at most one permission.
type EntryRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    bool,
    i64,
    Option<String>,
);

fn storage_err(context: &str) -> impl FnOnce(sqlx::Error) -> AclError + '_ {
    move |e| AclError::storage(format!("{context}: {e}"))
}

/// Entry store backed by a SQLite database.
pub struct SqliteEntryStore {
    pool: SqlitePool,
    catalog: Arc<PermissionCatalog>,
}

impl SqliteEntryStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite URL, e.g. `sqlite://acl.db`
    /// * `max_connections` - Pool size
    /// * `catalog` - Catalog used to intern permissions read back from disk
    pub async fn connect(
        url: &str,
        max_connections: u32,
        catalog: Arc<PermissionCatalog>,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err("invalid sqlite url"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(storage_err("failed to open sqlite database"))?;
        Self::from_pool(pool, catalog).await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn from_pool(pool: SqlitePool, catalog: Arc<PermissionCatalog>) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(storage_err("failed to apply schema"))?;
        }
        tracing::debug!("sqlite entry store ready");
        Ok(Self { pool, catalog })
    }

    /// Fold joined rows (ordered by entry) into entries, preserving order.
    fn collect_entries(&self, rows: Vec<EntryRow>) -> Vec<Entry> {
        let mut entries: Vec<Entry> = Vec::new();
        for (id, rtype, rname, ns, ident, mode, deny, sort_key, permission) in rows {
            let id = EntryId(id);
            if entries.last().map(|e| e.id) != Some(id) {
                entries.push(Entry {
                    id,
                    key: EntryKey {
                        resource: ResourceKey {
                            resource_type: rtype,
                            name: rname,
                        },
                        subject: SubjectRef {
                            namespace: ns,
                            identifier: ident,
                        },
                        mode,
                        deny,
                    },
                    sort_key,
                    permissions: BTreeSet::new(),
                });
            }
            if let (Some(name), Some(entry)) = (permission, entries.last_mut()) {
                entry.permissions.insert(self.catalog.get_or_create(&name));
            }
        }
        entries
    }

    async fn fetch_by_id(&self, id: EntryId) -> Result<Option<Entry>> {
        let query = format!("{SELECT_ENTRY} WHERE e.id = ?");
        let rows: Vec<EntryRow> = sqlx::query_as(&query)
            .bind(id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("failed to load entry"))?;
        Ok(self.collect_entries(rows).pop())
    }

    async fn require(&self, id: EntryId) -> Result<Entry> {
        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| AclError::storage(format!("entry {id} does not exist")))
    }
}

impl std::fmt::Debug for SqliteEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEntryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn get_or_create_entry(&self, key: &EntryKey, sort_key: i64) -> Result<Entry> {
        sqlx::query(
            "INSERT INTO acl_entries
                (resource_type, resource_name, subject_namespace, subject_identifier, mode, deny, sort_key)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (resource_type, resource_name, subject_namespace, subject_identifier, mode, deny)
             DO NOTHING",
        )
        .bind(&key.resource.resource_type)
        .bind(&key.resource.name)
        .bind(&key.subject.namespace)
        .bind(&key.subject.identifier)
        .bind(&key.mode)
        .bind(key.deny)
        .bind(sort_key)
        .execute(&self.pool)
        .await
        .map_err(storage_err("failed to create entry"))?;

        self.find_entry(key)
            .await?
            .ok_or_else(|| AclError::storage(format!("entry {key} vanished after creation")))
    }

    async fn grant_permissions(
        &self,
        key: &EntryKey,
        sort_key: i64,
        permissions: &[Permission],
    ) -> Result<Entry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_err("failed to begin transaction"))?;
        sqlx::query(
            "INSERT INTO acl_entries
                (resource_type, resource_name, subject_namespace, subject_identifier, mode, deny, sort_key)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (resource_type, resource_name, subject_namespace, subject_identifier, mode, deny)
             DO NOTHING",
        )
        .bind(&key.resource.resource_type)
        .bind(&key.resource.name)
        .bind(&key.subject.namespace)
        .bind(&key.subject.identifier)
        .bind(&key.mode)
        .bind(key.deny)
        .bind(sort_key)
        .execute(&mut *tx)
        .await
        .map_err(storage_err("failed to create entry"))?;

        let (id,): (i64,) = sqlx::query_as(
            "SELECT id FROM acl_entries
             WHERE resource_type = ? AND resource_name = ? AND subject_namespace = ?
               AND subject_identifier = ? AND mode = ? AND deny = ?",
        )
        .bind(&key.resource.resource_type)
        .bind(&key.resource.name)
        .bind(&key.subject.namespace)
        .bind(&key.subject.identifier)
        .bind(&key.mode)
        .bind(key.deny)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err("failed to find created entry"))?;

        for permission in permissions {
            sqlx::query(
                "INSERT INTO acl_entry_permissions (entry_id, permission) VALUES (?, ?)
                 ON CONFLICT (entry_id, permission) DO NOTHING",
            )
            .bind(id)
            .bind(permission.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err("failed to add permission"))?;
        }
        tx.commit()
            .await
            .map_err(storage_err("failed to commit grant"))?;
        self.require(EntryId(id)).await
    }

    async fn find_entry(&self, key: &EntryKey) -> Result<Option<Entry>> {
        let query = format!(
            "{SELECT_ENTRY}
             WHERE e.resource_type = ? AND e.resource_name = ? AND e.subject_namespace = ?
               AND e.subject_identifier = ? AND e.mode = ? AND e.deny = ?"
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&query)
            .bind(&key.resource.resource_type)
            .bind(&key.resource.name)
            .bind(&key.subject.namespace)
            .bind(&key.subject.identifier)
            .bind(&key.mode)
            .bind(key.deny)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("failed to find entry"))?;
        Ok(self.collect_entries(rows).pop())
    }

    async fn add_permissions(&self, id: EntryId, permissions: &[Permission]) -> Result<Entry> {
        self.require(id).await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_err("failed to begin transaction"))?;
        for permission in permissions {
            sqlx::query(
                "INSERT INTO acl_entry_permissions (entry_id, permission) VALUES (?, ?)
                 ON CONFLICT (entry_id, permission) DO NOTHING",
            )
            .bind(id.0)
            .bind(permission.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err("failed to add permission"))?;
        }
        tx.commit()
            .await
            .map_err(storage_err("failed to commit permissions"))?;
        self.require(id).await
    }

    async fn remove_permissions(
        &self,
        id: EntryId,
        permissions: &[Permission],
    ) -> Result<Option<Entry>> {
        self.require(id).await?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_err("failed to begin transaction"))?;
        for permission in permissions {
            sqlx::query("DELETE FROM acl_entry_permissions WHERE entry_id = ? AND permission = ?")
                .bind(id.0)
                .bind(permission.as_str())
                .execute(&mut *tx)
                .await
                .map_err(storage_err("failed to remove permission"))?;
        }
        let (remaining,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM acl_entry_permissions WHERE entry_id = ?")
                .bind(id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_err("failed to count permissions"))?;
        if remaining == 0 {
            sqlx::query("DELETE FROM acl_entries WHERE id = ?")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_err("failed to delete entry"))?;
        }
        tx.commit()
            .await
            .map_err(storage_err("failed to commit removal"))?;

        if remaining == 0 {
            Ok(None)
        } else {
            self.fetch_by_id(id).await
        }
    }

    async fn list_entries(&self, resource: &ResourceKey, deny: bool) -> Result<Vec<Entry>> {
        let query = format!(
            "{SELECT_ENTRY}
             WHERE e.resource_type = ? AND e.resource_name = ? AND e.deny = ?
             ORDER BY e.sort_key, e.id"
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&query)
            .bind(&resource.resource_type)
            .bind(&resource.name)
            .bind(deny)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("failed to list entries"))?;
        Ok(self.collect_entries(rows))
    }

    async fn set_sort_key(&self, id: EntryId, sort_key: i64) -> Result<Entry> {
        sqlx::query("UPDATE acl_entries SET sort_key = ? WHERE id = ?")
            .bind(sort_key)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(storage_err("failed to update sort key"))?;
        self.require(id).await
    }

    async fn clear_resource(&self, resource: &ResourceKey) -> Result<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_err("failed to begin transaction"))?;
        sqlx::query(
            "DELETE FROM acl_entry_permissions WHERE entry_id IN
                (SELECT id FROM acl_entries WHERE resource_type = ? AND resource_name = ?)",
        )
        .bind(&resource.resource_type)
        .bind(&resource.name)
        .execute(&mut *tx)
        .await
        .map_err(storage_err("failed to clear permissions"))?;
        let done = sqlx::query("DELETE FROM acl_entries WHERE resource_type = ? AND resource_name = ?")
            .bind(&resource.resource_type)
            .bind(&resource.name)
            .execute(&mut *tx)
            .await
            .map_err(storage_err("failed to clear entries"))?;
        tx.commit()
            .await
            .map_err(storage_err("failed to commit clear"))?;
        Ok(done.rows_affected() as usize)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ============================================================================
// Tests
// ============================================================================
