//! ACL entry storage.
//!
//! The [`EntryStore`] trait is the only thing the engine knows about
//! persistence. Store operations are plain CRUD: they never raise domain
//! errors, only [`AclError::Storage`](crate::AclError::Storage) when the
//! backend itself fails.
//!
//! # Backends
//!
//! - [`MemoryEntryStore`]: in-process map (always available)
//! - `SqliteEntryStore`: SQLite via `sqlx` (feature: `acl-sqlite`)

pub mod memory;

#[cfg(feature = "acl-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::permission::{Permission, PermissionCatalog};
use crate::types::{Entry, EntryId, EntryKey, ResourceKey};

pub use memory::MemoryEntryStore;

#[cfg(feature = "acl-sqlite")]
pub use sqlite::SqliteEntryStore;

/// Repository of grant/deny entries.
///
/// Implementations must make [`get_or_create_entry`](Self::get_or_create_entry)
/// atomic per [`EntryKey`]: concurrent callers with the same key observe the
/// same entry.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Return the entry for `key`, creating it (empty, with `sort_key`) if
    /// needed.
    async fn get_or_create_entry(&self, key: &EntryKey, sort_key: i64) -> Result<Entry>;

    /// Return the entry for `key` if it exists.
    async fn find_entry(&self, key: &EntryKey) -> Result<Option<Entry>>;

    /// Union `permissions` into the entry's permission set.
    async fn add_permissions(&self, id: EntryId, permissions: &[Permission]) -> Result<Entry>;

    /// Get-or-create the entry for `key` and union `permissions` into it as
    /// one step, so no empty entry survives a failed grant.
    ///
    /// The default composes [`get_or_create_entry`](Self::get_or_create_entry)
    /// and [`add_permissions`](Self::add_permissions), removing the entry
    /// again if it is still empty when the second call fails. Backends that
    /// can do both atomically should override it.
    async fn grant_permissions(
        &self,
        key: &EntryKey,
        sort_key: i64,
        permissions: &[Permission],
    ) -> Result<Entry> {
        let entry = self.get_or_create_entry(key, sort_key).await?;
        match self.add_permissions(entry.id, permissions).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                if entry.permissions.is_empty() {
                    if let Err(cleanup) = self.remove_permissions(entry.id, &[]).await {
                        tracing::warn!(entry = %key, error = %cleanup, "failed to drop empty entry");
                    }
                }
                Err(e)
            }
        }
    }

    /// Remove `permissions` from the entry. When the set becomes empty the
    /// entry is deleted and `None` is returned.
    async fn remove_permissions(
        &self,
        id: EntryId,
        permissions: &[Permission],
    ) -> Result<Option<Entry>>;

    /// Entries for `resource` with the given deny flag, ascending by
    /// `(sort_key, id)`.
    async fn list_entries(&self, resource: &ResourceKey, deny: bool) -> Result<Vec<Entry>>;

    /// All entries for `resource`: deny entries first, then allow entries.
    async fn entries_for(&self, resource: &ResourceKey) -> Result<Vec<Entry>> {
        let mut entries = self.list_entries(resource, true).await?;
        entries.extend(self.list_entries(resource, false).await?);
        Ok(entries)
    }

    /// Change an entry's evaluation order.
    async fn set_sort_key(&self, id: EntryId, sort_key: i64) -> Result<Entry>;

    /// Delete every entry for `resource`, returning how many were removed.
    async fn clear_resource(&self, resource: &ResourceKey) -> Result<usize>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Sort entries into evaluation order.
pub(crate) fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by_key(|e| (e.sort_key, e.id));
}

/// Create the entry store described by `config`.
///
/// # Errors
///
/// Returns a configuration error if the backend is unavailable in this
/// build, or a storage error if it cannot be opened.
pub async fn create_entry_store(
    config: &StoreConfig,
    catalog: Arc<PermissionCatalog>,
) -> Result<Arc<dyn EntryStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryEntryStore::new())),
        #[cfg(feature = "acl-sqlite")]
        StoreBackend::Sqlite => {
            let store = SqliteEntryStore::connect(&config.url, config.max_connections, catalog)
                .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "acl-sqlite"))]
        StoreBackend::Sqlite => {
            let _ = catalog;
            Err(crate::AclError::config(
                "the sqlite entry store requires the `acl-sqlite` feature",
            ))
        }
    }
}

// ============================================================================
// Backend conformance checks
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_store() {
        let config = StoreConfig::default();
        let store = create_entry_store(&config, Arc::new(PermissionCatalog::new()))
            .await
            .unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[cfg(not(feature = "acl-sqlite"))]
    #[tokio::test]
    async fn test_create_sqlite_store_without_feature() {
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            ..Default::default()
        };
        let err = create_entry_store(&config, Arc::new(PermissionCatalog::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, crate::AclError::Config(_)));
    }

    /// Delegates to memory but fails every `add_permissions`, so the
    /// default `grant_permissions` has to clean up.
    struct FailingAdd(MemoryEntryStore);

    #[async_trait]
    impl EntryStore for FailingAdd {
        async fn get_or_create_entry(&self, key: &EntryKey, sort_key: i64) -> Result<Entry> {
            self.0.get_or_create_entry(key, sort_key).await
        }

        async fn find_entry(&self, key: &EntryKey) -> Result<Option<Entry>> {
            self.0.find_entry(key).await
        }

        async fn add_permissions(&self, _id: EntryId, _p: &[Permission]) -> Result<Entry> {
            Err(crate::AclError::storage("disk full"))
        }

        async fn remove_permissions(
            &self,
            id: EntryId,
            permissions: &[Permission],
        ) -> Result<Option<Entry>> {
            self.0.remove_permissions(id, permissions).await
        }

        async fn list_entries(&self, resource: &ResourceKey, deny: bool) -> Result<Vec<Entry>> {
            self.0.list_entries(resource, deny).await
        }

        async fn set_sort_key(&self, id: EntryId, sort_key: i64) -> Result<Entry> {
            self.0.set_sort_key(id, sort_key).await
        }

        async fn clear_resource(&self, resource: &ResourceKey) -> Result<usize> {
            self.0.clear_resource(resource).await
        }

        fn name(&self) -> &str {
            "failing-add"
        }
    }

    #[tokio::test]
    async fn test_default_grant_drops_empty_entry_on_failure() {
        let store = FailingAdd(MemoryEntryStore::new());
        let catalog = PermissionCatalog::new();
        let key = conformance::key("board", "news", "account", "bob", false);

        let err = store
            .grant_permissions(&key, 0, &[catalog.get_or_create("read")])
            .await
            .unwrap_err();
        assert!(matches!(err, crate::AclError::Storage(_)));
        assert!(store.find_entry(&key).await.unwrap().is_none());
        assert!(store.0.is_empty().await);
    }

    #[tokio::test]
    async fn test_default_grant_keeps_existing_entry_on_failure() {
        let store = FailingAdd(MemoryEntryStore::new());
        let catalog = PermissionCatalog::new();
        let key = conformance::key("board", "news", "account", "bob", false);
        let entry = store.0.get_or_create_entry(&key, 0).await.unwrap();
        store
            .0
            .add_permissions(entry.id, &[catalog.get_or_create("read")])
            .await
            .unwrap();

        assert!(store
            .grant_permissions(&key, 0, &[catalog.get_or_create("post")])
            .await
            .is_err());
        let kept = store.find_entry(&key).await.unwrap().unwrap();
        assert_eq!(kept.permission_names(), vec!["read"]);
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EntryStore) {}
    }
}
