//! Permission names and the permission catalog.
//!
//! A [`Permission`] is a normalized (trimmed, lowercased) name. The
//! [`PermissionCatalog`] interns names so every `Permission` for the same
//! name shares one allocation for the lifetime of the catalog.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

/// Reserved permission that matches every permission check.
pub const ALL: &str = "all";

/// Normalize a permission token: trim surrounding whitespace and lowercase.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Permission
// ============================================================================

/// An interned, normalized permission name.
///
/// Cloning is an `Arc` clone. Equality compares pointers first and falls
/// back to the string, so permissions created outside a catalog still
/// compare correctly.
#[derive(Clone)]
pub struct Permission(Arc<str>);

impl Permission {
    /// Build a permission without interning. Prefer
    /// [`PermissionCatalog::get_or_create`].
    pub(crate) fn from_normalized(name: Arc<str>) -> Self {
        Self(name)
    }

    /// The permission name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved `all` permission.
    pub fn is_all(&self) -> bool {
        &*self.0 == ALL
    }

    /// Whether both permissions share the same interned allocation.
    pub fn ptr_eq(&self, other: &Permission) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl Eq for Permission {}

impl Hash for Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for Permission {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Permission {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permission({:?})", &*self.0)
    }
}

// ============================================================================
// PermissionCatalog
// ============================================================================

/// Canonical, deduplicated registry of permission names.
///
/// Permissions are created on first use and never removed.
#[derive(Debug, Default)]
pub struct PermissionCatalog {
    names: RwLock<HashMap<Arc<str>, Permission>>,
}

impl PermissionCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the permission for `name`, creating it if needed.
    pub fn get_or_create(&self, name: &str) -> Permission {
        let normalized = normalize(name);
        if let Some(existing) = self.names.read().get(normalized.as_str()) {
            return existing.clone();
        }

        let mut names = self.names.write();
        // Another writer may have won the race between the two locks.
        if let Some(existing) = names.get(normalized.as_str()) {
            return existing.clone();
        }
        let key: Arc<str> = Arc::from(normalized);
        let permission = Permission::from_normalized(Arc::clone(&key));
        names.insert(key, permission.clone());
        permission
    }

    /// Look up an existing permission without creating it.
    pub fn lookup(&self, name: &str) -> Option<Permission> {
        self.names.read().get(normalize(name).as_str()).cloned()
    }

    /// Number of distinct permissions created so far.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether no permission has been created yet.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    /// All known permission names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }
}

// ============================================================================
// Tests
// ============================================================================
