//! Bounded memo of `check` decisions.
//!
//! The cache is owned by the engine. Every successful mutation on a resource
//! calls [`DecisionCache::invalidate`] for that resource before returning.
//!
//! A decision computed while a mutation was in flight must not be stored
//! after that mutation's invalidation. Callers take a generation with
//! [`DecisionCache::generation`] before evaluating and pass it to
//! [`DecisionCache::insert`]; the insert is skipped if any invalidation
//! happened in between.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{AclError, Result};
use crate::types::ResourceKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    resource: ResourceKey,
    actor_id: String,
    permission: String,
}

#[derive(Debug)]
struct Inner {
    decisions: LruCache<DecisionKey, bool>,
    generation: u64,
}

/// LRU cache of `(resource, actor, permission) -> allowed`.
#[derive(Debug)]
pub struct DecisionCache {
    inner: Mutex<Inner>,
}

impl DecisionCache {
    /// Create a cache holding at most `capacity` decisions.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| AclError::config("decision cache capacity must be positive"))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                decisions: LruCache::new(capacity),
                generation: 0,
            }),
        })
    }

    fn key(resource: &ResourceKey, actor_id: &str, permission: &str) -> DecisionKey {
        DecisionKey {
            resource: resource.clone(),
            actor_id: actor_id.to_string(),
            permission: permission.to_string(),
        }
    }

    /// A previously cached decision.
    pub fn get(&self, resource: &ResourceKey, actor_id: &str, permission: &str) -> Option<bool> {
        self.inner
            .lock()
            .decisions
            .get(&Self::key(resource, actor_id, permission))
            .copied()
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Remember a decision computed at `generation`. Returns `false` (and
    /// stores nothing) if an invalidation happened since.
    pub fn insert(
        &self,
        generation: u64,
        resource: &ResourceKey,
        actor_id: &str,
        permission: &str,
        allowed: bool,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner
            .decisions
            .put(Self::key(resource, actor_id, permission), allowed);
        true
    }

    /// Drop every decision for `resource`, returning how many were dropped.
    pub fn invalidate(&self, resource: &ResourceKey) -> usize {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.wrapping_add(1);
        let stale: Vec<DecisionKey> = inner
            .decisions
            .iter()
            .filter(|(k, _)| &k.resource == resource)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            inner.decisions.pop(key);
        }
        stale.len()
    }

    /// Drop every decision.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.decisions.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().decisions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().decisions.cap().get()
    }
}

// ============================================================================
// Tests
// ============================================================================
