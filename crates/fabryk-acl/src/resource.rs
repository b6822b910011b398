//! Protected resources and resource resolvers.
//!
//! The engine treats resources as opaque: it only needs a stable
//! [`ResourceKey`] and the vocabularies used to validate mutations.
//! Resource resolvers map `"type:name"` strings to resources, one resolver
//! per resource type.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AclError, Result};
use crate::permission::normalize;
use crate::subject::Actor;
use crate::types::ResourceKey;

/// Mode used when the caller does not pick one.
pub const DEFAULT_MODE: &str = "default";

// ============================================================================
// Resource
// ============================================================================

/// Any addressable entity protected by ACL entries.
pub trait Resource: Send + Sync {
    /// Stable identity; entries are stored under this key.
    fn resource_key(&self) -> ResourceKey;

    /// Permission names that may be granted or denied on this resource.
    fn available_permissions(&self) -> BTreeSet<String>;

    /// Modes entries on this resource may use.
    fn available_modes(&self) -> BTreeSet<String> {
        BTreeSet::from([DEFAULT_MODE.to_string()])
    }
}

/// A resource described entirely by data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleResource {
    key: ResourceKey,
    permissions: BTreeSet<String>,
    modes: BTreeSet<String>,
}

impl SimpleResource {
    /// Create a resource with the given permission vocabulary and only the
    /// default mode.
    pub fn new<I, S>(key: ResourceKey, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            key,
            permissions: permissions.into_iter().map(|p| normalize(p.as_ref())).collect(),
            modes: BTreeSet::from([DEFAULT_MODE.to_string()]),
        }
    }

    /// Add a mode to the vocabulary.
    pub fn with_mode(mut self, mode: impl AsRef<str>) -> Self {
        self.modes.insert(normalize(mode.as_ref()));
        self
    }
}

impl Resource for SimpleResource {
    fn resource_key(&self) -> ResourceKey {
        self.key.clone()
    }

    fn available_permissions(&self) -> BTreeSet<String> {
        self.permissions.clone()
    }

    fn available_modes(&self) -> BTreeSet<String> {
        self.modes.clone()
    }
}

// ============================================================================
// ResourceResolver
// ============================================================================

/// Capability interface for one resource type.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// The resource type this resolver is registered under.
    fn resource_type(&self) -> &str;

    /// Find the resource named `name` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such resource exists.
    async fn find(&self, actor: &dyn Actor, name: &str) -> Result<Arc<dyn Resource>>;
}

/// In-memory resolver over a fixed set of resources of one type.
#[derive(Default)]
pub struct StaticResourceResolver {
    resource_type: String,
    resources: HashMap<String, Arc<dyn Resource>>,
}

impl StaticResourceResolver {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into().to_lowercase(),
            resources: HashMap::new(),
        }
    }

    /// Add a resource, keyed by its name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the resource has a different type.
    pub fn insert(&mut self, resource: Arc<dyn Resource>) -> Result<()> {
        let key = resource.resource_key();
        if key.resource_type != self.resource_type {
            return Err(AclError::config(format!(
                "resource `{key}` does not belong to resolver `{}`",
                self.resource_type
            )));
        }
        self.resources.insert(key.name, resource);
        Ok(())
    }

    pub fn with(mut self, resource: Arc<dyn Resource>) -> Result<Self> {
        self.insert(resource)?;
        Ok(self)
    }
}

#[async_trait]
impl ResourceResolver for StaticResourceResolver {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn find(&self, _actor: &dyn Actor, name: &str) -> Result<Arc<dyn Resource>> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| AclError::not_found(format!("{}:{name}", self.resource_type)))
    }
}

// ============================================================================
// ResourceRegistry
// ============================================================================

/// Resource type → resolver map, populated once at startup.
#[derive(Default, Clone)]
pub struct ResourceRegistry {
    resolvers: HashMap<String, Arc<dyn ResourceResolver>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under its resource type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the type is already taken.
    pub fn register(&mut self, resolver: Arc<dyn ResourceResolver>) -> Result<()> {
        let resource_type = resolver.resource_type().to_lowercase();
        if self.resolvers.contains_key(&resource_type) {
            return Err(AclError::config(format!(
                "resource type `{resource_type}` is already registered"
            )));
        }
        tracing::debug!(resource_type = %resource_type, "registered resource resolver");
        self.resolvers.insert(resource_type, resolver);
        Ok(())
    }

    /// Registered resource types, sorted.
    pub fn resource_types(&self) -> BTreeSet<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }

    /// Resolve a `"type:name"` string.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for malformed strings, unknown types, and
    /// resources the resolver cannot find.
    pub async fn resolve(&self, actor: &dyn Actor, path: &str) -> Result<Arc<dyn Resource>> {
        let key = ResourceKey::parse(path).ok_or_else(|| {
            AclError::not_found(format!(
                "invalid resource reference `{path}` (expected \"type:name\")"
            ))
        })?;
        let resolver = self.resolvers.get(&key.resource_type).ok_or_else(|| {
            AclError::not_found(format!("unknown resource type `{}`", key.resource_type))
        })?;
        resolver.find(actor, &key.name).await
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Principal;

    fn board(name: &str) -> Arc<dyn Resource> {
        Arc::new(SimpleResource::new(
            ResourceKey::new("board", name),
            ["Read", "post "],
        ))
    }

    fn registry() -> ResourceRegistry {
        let boards = StaticResourceResolver::new("board")
            .with(board("news"))
            .unwrap();
        let mut registry = ResourceRegistry::new();
        registry.register(Arc::new(boards)).unwrap();
        registry
    }

    #[test]
    fn test_simple_resource_vocabulary() {
        let r = SimpleResource::new(ResourceKey::new("board", "news"), ["Read", "post "])
            .with_mode("Override");
        assert_eq!(
            r.available_permissions(),
            BTreeSet::from(["post".to_string(), "read".to_string()])
        );
        assert!(r.available_modes().contains("default"));
        assert!(r.available_modes().contains("override"));
    }

    #[test]
    fn test_static_resolver_rejects_foreign_type() {
        let mut resolver = StaticResourceResolver::new("board");
        let channel: Arc<dyn Resource> = Arc::new(SimpleResource::new(
            ResourceKey::new("channel", "ooc"),
            ["send"],
        ));
        assert!(resolver.insert(channel).is_err());
    }

    #[tokio::test]
    async fn test_resolve() {
        let registry = registry();
        let actor = Principal::new("a");
        let r = registry.resolve(&actor, "board:news").await.unwrap();
        assert_eq!(r.resource_key(), ResourceKey::new("board", "news"));

        let r = registry.resolve(&actor, "Board:news").await.unwrap();
        assert_eq!(r.resource_key().to_string(), "board:news");
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let registry = registry();
        let actor = Principal::new("a");

        for path in ["board:missing", "forum:news", "no-colon", ":x"] {
            let err = registry.resolve(&actor, path).await.err().unwrap();
            assert!(err.is_not_found(), "{path} should be NotFound");
        }
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(StaticResourceResolver::new("BOARD")))
            .unwrap_err();
        assert!(matches!(err, AclError::Config(_)));
        assert_eq!(registry.resource_types(), BTreeSet::from(["board"]));
    }
}
