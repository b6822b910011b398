//! Core ACL types: resource and subject references, entries.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::permission::{Permission, ALL};

// ============================================================================
// References
// ============================================================================

/// Split `"prefix:rest"` into trimmed, non-empty halves.
fn split_token(s: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = s.trim().split_once(':')?;
    let (prefix, rest) = (prefix.trim(), rest.trim());
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    Some((prefix, rest))
}

/// Stable identity of a protected resource: `"type:name"`, e.g. `"board:news"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource type; selects the resource resolver. Lowercased.
    pub resource_type: String,
    /// Name within the type.
    pub name: String,
}

impl ResourceKey {
    /// Create a key; the type is lowercased.
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into().to_lowercase(),
            name: name.into(),
        }
    }

    /// Parse `"type:name"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (t, name) = split_token(s)?;
        Some(Self::new(t, name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.name)
    }
}

/// Canonical subject reference: `"namespace:identifier"`, e.g. `"account:jane"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    /// Namespace; selects the subject resolver. Lowercased.
    pub namespace: String,
    /// Identifier within the namespace, as canonicalised by its resolver.
    pub identifier: String,
}

impl SubjectRef {
    /// Create a reference; the namespace is lowercased.
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into().to_lowercase(),
            identifier: identifier.into(),
        }
    }

    /// Parse `"namespace:identifier"` without validating the identifier.
    pub fn parse(s: &str) -> Option<Self> {
        let (ns, id) = split_token(s)?;
        Some(Self::new(ns, id))
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.identifier)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Store-assigned entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The uniqueness tuple of an entry: at most one entry exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub resource: ResourceKey,
    pub subject: SubjectRef,
    /// Caller-defined grouping tag.
    pub mode: String,
    pub deny: bool,
}

impl EntryKey {
    pub fn new(
        resource: ResourceKey,
        subject: SubjectRef,
        mode: impl Into<String>,
        deny: bool,
    ) -> Self {
        Self {
            resource,
            subject,
            mode: mode.into(),
            deny,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}[{}]",
            self.resource,
            if self.deny { "deny" } else { "allow" },
            self.subject,
            self.mode
        )
    }
}

/// A stored grant or deny record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub key: EntryKey,
    /// Evaluation order within a resource/deny pass, ascending.
    pub sort_key: i64,
    pub permissions: BTreeSet<Permission>,
}

impl Entry {
    /// Whether this entry covers `permission` (already normalized), either
    /// directly or through the reserved `all` permission.
    pub fn covers(&self, permission: &str) -> bool {
        self.permissions.contains(permission) || self.permissions.contains(ALL)
    }

    pub fn is_deny(&self) -> bool {
        self.key.deny
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.key.subject
    }

    /// Permission names, sorted.
    pub fn permission_names(&self) -> Vec<&str> {
        self.permissions.iter().map(Permission::as_str).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionCatalog;

    #[test]
    fn test_resource_key_parse() {
        let k = ResourceKey::parse("Board:newsroom").unwrap();
        assert_eq!(k.resource_type, "board");
        assert_eq!(k.name, "newsroom");
        assert_eq!(k.to_string(), "board:newsroom");

        assert!(ResourceKey::parse("nocolon").is_none());
        assert!(ResourceKey::parse(":name").is_none());
        assert!(ResourceKey::parse("type:").is_none());
        assert!(ResourceKey::parse("  ").is_none());
    }

    #[test]
    fn test_subject_ref_parse() {
        let s = SubjectRef::parse(" account:jane ").unwrap();
        assert_eq!(s.namespace, "account");
        assert_eq!(s.identifier, "jane");
        assert_eq!(s.to_string(), "account:jane");
    }

    #[test]
    fn test_subject_ref_keeps_rest_after_first_colon() {
        let s = SubjectRef::parse("account:a:b").unwrap();
        assert_eq!(s.identifier, "a:b");
    }

    #[test]
    fn test_entry_covers() {
        let catalog = PermissionCatalog::new();
        let key = EntryKey::new(
            ResourceKey::new("board", "news"),
            SubjectRef::new("account", "bob"),
            "default",
            false,
        );
        let mut entry = Entry {
            id: EntryId(1),
            key,
            sort_key: 0,
            permissions: BTreeSet::from([catalog.get_or_create("read")]),
        };
        assert!(entry.covers("read"));
        assert!(!entry.covers("post"));

        entry.permissions.insert(catalog.get_or_create("all"));
        assert!(entry.covers("post"));
        assert_eq!(entry.permission_names(), vec!["all", "read"]);
    }

    #[test]
    fn test_entry_key_display() {
        let key = EntryKey::new(
            ResourceKey::new("board", "news"),
            SubjectRef::new("basic", "everyone"),
            "default",
            true,
        );
        assert_eq!(key.to_string(), "board:news deny basic:everyone[default]");
    }
}
