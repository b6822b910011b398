//! In-memory entry store.
//!
//! Suitable for tests and for hosts that rebuild their ACLs at startup.
//! A single `RwLock` guards all state, so get-or-create is atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AclError, Result};
use crate::permission::Permission;
use crate::store::{sort_entries, EntryStore};
use crate::types::{Entry, EntryId, EntryKey, ResourceKey};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    by_key: HashMap<EntryKey, EntryId>,
    entries: BTreeMap<EntryId, Entry>,
}

impl State {
    fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| AclError::storage(format!("entry {id} does not exist")))
    }
}

/// Entry store backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    state: RwLock<State>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all resources.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get_or_create_entry(&self, key: &EntryKey, sort_key: i64) -> Result<Entry> {
        let mut state = self.state.write().await;
        if let Some(id) = state.by_key.get(key).copied() {
            return Ok(state.entry_mut(id)?.clone());
        }

        state.next_id += 1;
        let id = EntryId(state.next_id);
        let entry = Entry {
            id,
            key: key.clone(),
            sort_key,
            permissions: Default::default(),
        };
        state.by_key.insert(key.clone(), id);
        state.entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn grant_permissions(
        &self,
        key: &EntryKey,
        sort_key: i64,
        permissions: &[Permission],
    ) -> Result<Entry> {
        let mut state = self.state.write().await;
        let id = match state.by_key.get(key).copied() {
            Some(id) => id,
            None => {
                state.next_id += 1;
                let id = EntryId(state.next_id);
                state.by_key.insert(key.clone(), id);
                state.entries.insert(
                    id,
                    Entry {
                        id,
                        key: key.clone(),
                        sort_key,
                        permissions: Default::default(),
                    },
                );
                id
            }
        };
        let entry = state.entry_mut(id)?;
        entry.permissions.extend(permissions.iter().cloned());
        Ok(entry.clone())
    }

    async fn find_entry(&self, key: &EntryKey) -> Result<Option<Entry>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(key)
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn add_permissions(&self, id: EntryId, permissions: &[Permission]) -> Result<Entry> {
        let mut state = self.state.write().await;
        let entry = state.entry_mut(id)?;
        entry.permissions.extend(permissions.iter().cloned());
        Ok(entry.clone())
    }

    async fn remove_permissions(
        &self,
        id: EntryId,
        permissions: &[Permission],
    ) -> Result<Option<Entry>> {
        let mut state = self.state.write().await;
        let entry = state.entry_mut(id)?;
        for permission in permissions {
            entry.permissions.remove(permission);
        }
        if !entry.permissions.is_empty() {
            return Ok(Some(entry.clone()));
        }

        if let Some(removed) = state.entries.remove(&id) {
            state.by_key.remove(&removed.key);
        }
        Ok(None)
    }

    async fn list_entries(&self, resource: &ResourceKey, deny: bool) -> Result<Vec<Entry>> {
        let state = self.state.read().await;
        let mut entries: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| e.key.deny == deny && &e.key.resource == resource)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn set_sort_key(&self, id: EntryId, sort_key: i64) -> Result<Entry> {
        let mut state = self.state.write().await;
        let entry = state.entry_mut(id)?;
        entry.sort_key = sort_key;
        Ok(entry.clone())
    }

    async fn clear_resource(&self, resource: &ResourceKey) -> Result<usize> {
        let mut state = self.state.write().await;
        let doomed: Vec<EntryId> = state
            .entries
            .values()
            .filter(|e| &e.key.resource == resource)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            if let Some(removed) = state.entries.remove(id) {
                state.by_key.remove(&removed.key);
            }
        }
        Ok(doomed.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_store_conformance() {
        let store = MemoryEntryStore::new();
        conformance::run_all(&store).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_entry_is_storage_error() {
        let store = MemoryEntryStore::new();
        let err = store.set_sort_key(EntryId(42), 1).await.unwrap_err();
        assert!(matches!(err, AclError::Storage(_)));
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_entry() {
        let store = Arc::new(MemoryEntryStore::new());
        let key = conformance::key("board", "news", "account", "bob", false);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create_entry(&key, 0).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);
    }
}
