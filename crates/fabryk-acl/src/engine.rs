//! The access engine: evaluation and mutation of ACL entries.
//!
//! Evaluation runs in two passes over a resource's entries, deny entries
//! first. Within a pass, entries are visited in `(sort_key, id)` order and
//! only entries whose subject namespace belongs to a resolver that handles
//! the actor are considered. The first covering entry decides:
//!
//! ```text
//! deny pass  ──match──► Denied   (check = false)
//!     │
//!     ▼
//! allow pass ──match──► Allowed  (check = true)
//!     │
//!     ▼
//!  NoMatch                       (check = false)
//! ```
//!
//! Store failures during evaluation are logged and treated as `NoMatch`.
//! Mutations come in two layers: [`AccessEngine::add`] / [`AccessEngine::remove`]
//! validate raw strings and aggregate every rejection, while
//! [`AccessEngine::grant`] / [`AccessEngine::revoke`] take validated values.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::DecisionCache;
use crate::config::AclConfig;
use crate::error::{AclError, Rejections, Result};
use crate::permission::{normalize, Permission, PermissionCatalog, ALL};
use crate::resource::{Resource, ResourceRegistry, ResourceResolver};
use crate::store::{create_entry_store, EntryStore};
use crate::subject::{Actor, EveryoneResolver, SubjectRegistry, SubjectResolver};
use crate::types::{Entry, EntryId, EntryKey, ResourceKey, SubjectRef};

// ============================================================================
// Decision
// ============================================================================

/// Outcome of evaluating one permission for one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A deny entry covered the permission.
    Denied(EntryId),
    /// An allow entry covered the permission and no deny entry did.
    Allowed(EntryId),
    /// No entry applied.
    NoMatch,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The entry that decided, if any.
    pub fn entry(&self) -> Option<EntryId> {
        match self {
            Decision::Denied(id) | Decision::Allowed(id) => Some(*id),
            Decision::NoMatch => None,
        }
    }
}

/// Subjects and permissions that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validated {
    pub subjects: Vec<SubjectRef>,
    pub permissions: Vec<Permission>,
}

// ============================================================================
// Builder
// ============================================================================

/// Wires an [`AccessEngine`] from configuration.
pub struct AccessEngineBuilder {
    config: AclConfig,
    catalog: Option<Arc<PermissionCatalog>>,
    store: Option<Arc<dyn EntryStore>>,
    subjects: Vec<Arc<dyn SubjectResolver>>,
    resources: Vec<Arc<dyn ResourceResolver>>,
}

impl AccessEngineBuilder {
    /// Share an existing permission catalog.
    pub fn with_catalog(mut self, catalog: Arc<PermissionCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use `store` instead of the backend named in the config.
    pub fn with_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_subject_resolver(mut self, resolver: Arc<dyn SubjectResolver>) -> Self {
        self.subjects.push(resolver);
        self
    }

    pub fn with_resource_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resources.push(resolver);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid config or duplicate
    /// registrations, and a storage error if the store cannot be opened.
    pub async fn build(self) -> Result<AccessEngine> {
        self.config.validate()?;

        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(PermissionCatalog::new()));

        let mut subjects = SubjectRegistry::new();
        subjects.register(Arc::new(EveryoneResolver::new(
            &self.config.universal_namespace,
            &self.config.universal_identifier,
        )))?;
        for resolver in self.subjects {
            subjects.register(resolver)?;
        }

        let mut resources = ResourceRegistry::new();
        for resolver in self.resources {
            resources.register(resolver)?;
        }

        let store = match self.store {
            Some(store) => store,
            None => create_entry_store(&self.config.store, Arc::clone(&catalog)).await?,
        };

        let cache = if self.config.cache.enabled {
            Some(DecisionCache::new(self.config.cache.capacity)?)
        } else {
            None
        };

        tracing::debug!(
            store = store.name(),
            namespaces = ?subjects.namespaces(),
            cache = cache.is_some(),
            "built access engine"
        );

        Ok(AccessEngine {
            config: self.config,
            catalog,
            store,
            subjects,
            resources,
            cache,
        })
    }
}

// ============================================================================
// AccessEngine
// ============================================================================

/// Evaluates and edits ACL entries. Cheap to share behind an `Arc`.
pub struct AccessEngine {
    config: AclConfig,
    catalog: Arc<PermissionCatalog>,
    store: Arc<dyn EntryStore>,
    subjects: SubjectRegistry,
    resources: ResourceRegistry,
    cache: Option<DecisionCache>,
}

impl AccessEngine {
    /// Start building an engine from `config`.
    pub fn builder(config: AclConfig) -> AccessEngineBuilder {
        AccessEngineBuilder {
            config,
            catalog: None,
            store: None,
            subjects: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn subjects(&self) -> &SubjectRegistry {
        &self.subjects
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn cache(&self) -> Option<&DecisionCache> {
        self.cache.as_ref()
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Evaluate `permission` for `actor` on `resource`, reporting which
    /// entry decided. Never fails; store errors yield `NoMatch`.
    pub async fn evaluate(
        &self,
        actor: &dyn Actor,
        resource: &dyn Resource,
        permission: &str,
    ) -> Decision {
        let permission = normalize(permission);
        let key = resource.resource_key();
        let resolvers = self.subjects.handling(actor);
        if resolvers.is_empty() {
            return Decision::NoMatch;
        }

        for deny in [true, false] {
            let entries = match self.store.list_entries(&key, deny).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        resource = %key,
                        actor = actor.actor_id(),
                        error = %e,
                        "entry lookup failed, denying"
                    );
                    return Decision::NoMatch;
                }
            };

            for resolver in &resolvers {
                let matched = entries.iter().find(|entry| {
                    entry.subject().namespace == resolver.namespace().to_lowercase()
                        && resolver.matches(actor, entry.subject())
                        && entry.covers(&permission)
                });
                if let Some(entry) = matched {
                    return if deny {
                        Decision::Denied(entry.id)
                    } else {
                        Decision::Allowed(entry.id)
                    };
                }
            }
        }
        Decision::NoMatch
    }

    /// Whether `actor` holds `permission` on `resource`.
    pub async fn check(&self, actor: &dyn Actor, resource: &dyn Resource, permission: &str) -> bool {
        let Some(cache) = &self.cache else {
            return self.decide(actor, resource, permission).await;
        };

        let key = resource.resource_key();
        let normalized = normalize(permission);
        if let Some(allowed) = cache.get(&key, actor.actor_id(), &normalized) {
            return allowed;
        }

        let generation = cache.generation();
        let allowed = self.decide(actor, resource, &normalized).await;
        cache.insert(generation, &key, actor.actor_id(), &normalized, allowed);
        allowed
    }

    async fn decide(&self, actor: &dyn Actor, resource: &dyn Resource, permission: &str) -> bool {
        let decision = self.evaluate(actor, resource, permission).await;
        tracing::debug!(
            actor = actor.actor_id(),
            resource = %resource.resource_key(),
            permission,
            ?decision,
            "evaluated"
        );
        decision.is_allowed()
    }

    /// Like [`check`](Self::check), resolving `path` (`"type:name"`) first.
    /// Unresolvable paths are denied.
    pub async fn check_path(&self, actor: &dyn Actor, path: &str, permission: &str) -> bool {
        match self.resources.resolve(actor, path).await {
            Ok(resource) => self.check(actor, resource.as_ref(), permission).await,
            Err(e) => {
                tracing::debug!(path, error = %e, "resource not resolved, denying");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Validate subject and permission tokens against the registries and
    /// `resource`'s vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Rejected`] listing every rejected token.
    pub async fn validate<S, P>(
        &self,
        resource: &dyn Resource,
        subjects: &[S],
        permissions: &[P],
    ) -> Result<Validated>
    where
        S: AsRef<str> + Sync,
        P: AsRef<str> + Sync,
    {
        let (validated, rejections) = self.collect(resource, subjects, permissions).await;
        rejections.into_result()?;
        Ok(validated)
    }

    /// Resolve `mode` (or the configured default) against `resource`'s
    /// mode vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Rejected`] with the mode set if it is not
    /// available.
    pub fn validate_mode(&self, resource: &dyn Resource, mode: Option<&str>) -> Result<String> {
        let mut rejections = Rejections::new();
        let mode = self.check_mode(resource, mode, &mut rejections);
        rejections.into_result()?;
        Ok(mode)
    }

    async fn collect<S, P>(
        &self,
        resource: &dyn Resource,
        subjects: &[S],
        permissions: &[P],
    ) -> (Validated, Rejections)
    where
        S: AsRef<str> + Sync,
        P: AsRef<str> + Sync,
    {
        let mut rejections = Rejections::new();
        let (subjects, rejected) = self.subjects.parse_all(subjects).await;
        rejections.subjects = rejected;

        let available: BTreeSet<String> = resource
            .available_permissions()
            .iter()
            .map(|p| normalize(p))
            .collect();
        let mut validated = Vec::with_capacity(permissions.len());
        for token in permissions {
            let name = normalize(token.as_ref());
            if name.is_empty() || (name != ALL && !available.contains(&name)) {
                rejections.permissions.push(token.as_ref().to_string());
                continue;
            }
            let permission = self.catalog.get_or_create(&name);
            if !validated.contains(&permission) {
                validated.push(permission);
            }
        }

        (
            Validated {
                subjects,
                permissions: validated,
            },
            rejections,
        )
    }

    fn check_mode(
        &self,
        resource: &dyn Resource,
        mode: Option<&str>,
        rejections: &mut Rejections,
    ) -> String {
        let raw = mode.unwrap_or(&self.config.default_mode);
        let mode = normalize(raw);
        let available = resource.available_modes();
        if mode.is_empty() || !available.iter().any(|m| normalize(m) == mode) {
            rejections.mode = Some(raw.to_string());
        }
        mode
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Validate and grant (or deny, with `deny`) `permissions` to every
    /// subject. Nothing is written unless every token is valid.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Rejected`] listing every bad subject, permission
    /// and mode, or a storage error.
    pub async fn add<S, P>(
        &self,
        resource: &dyn Resource,
        subjects: &[S],
        permissions: &[P],
        mode: Option<&str>,
        deny: bool,
    ) -> Result<Vec<Entry>>
    where
        S: AsRef<str> + Sync,
        P: AsRef<str> + Sync,
    {
        let (validated, mut rejections) = self.collect(resource, subjects, permissions).await;
        let mode = self.check_mode(resource, mode, &mut rejections);
        rejections.into_result()?;
        self.grant(
            &resource.resource_key(),
            &validated.subjects,
            &validated.permissions,
            &mode,
            deny,
        )
        .await
    }

    /// Validate and revoke `permissions` from every subject's entry.
    ///
    /// # Errors
    ///
    /// As for [`add`](Self::add).
    pub async fn remove<S, P>(
        &self,
        resource: &dyn Resource,
        subjects: &[S],
        permissions: &[P],
        mode: Option<&str>,
        deny: bool,
    ) -> Result<Vec<Entry>>
    where
        S: AsRef<str> + Sync,
        P: AsRef<str> + Sync,
    {
        let (validated, mut rejections) = self.collect(resource, subjects, permissions).await;
        let mode = self.check_mode(resource, mode, &mut rejections);
        rejections.into_result()?;
        self.revoke(
            &resource.resource_key(),
            &validated.subjects,
            &validated.permissions,
            &mode,
            deny,
        )
        .await
    }

    /// Union `permissions` into the entry for each subject, creating
    /// entries as needed. `mode` is normalized. Returns the updated entries.
    pub async fn grant(
        &self,
        resource: &ResourceKey,
        subjects: &[SubjectRef],
        permissions: &[Permission],
        mode: &str,
        deny: bool,
    ) -> Result<Vec<Entry>> {
        if permissions.is_empty() {
            return Ok(Vec::new());
        }

        let mode = normalize(mode);
        let mut updated = Vec::with_capacity(subjects.len());
        let result = async {
            for subject in subjects {
                let key = EntryKey::new(resource.clone(), subject.clone(), mode.as_str(), deny);
                let entry = self
                    .store
                    .grant_permissions(&key, self.config.default_sort_key, permissions)
                    .await?;
                tracing::info!(entry = %entry.key, permissions = ?entry.permission_names(), "granted");
                updated.push(entry);
            }
            Ok::<_, AclError>(())
        }
        .await;

        self.invalidate(resource);
        result.map(|()| updated)
    }

    /// Remove `permissions` from the entry for each subject. Entries left
    /// empty are deleted. Returns the surviving entries that changed.
    pub async fn revoke(
        &self,
        resource: &ResourceKey,
        subjects: &[SubjectRef],
        permissions: &[Permission],
        mode: &str,
        deny: bool,
    ) -> Result<Vec<Entry>> {
        if permissions.is_empty() {
            return Ok(Vec::new());
        }

        let mode = normalize(mode);
        let mut remaining = Vec::new();
        let result = async {
            for subject in subjects {
                let key = EntryKey::new(resource.clone(), subject.clone(), mode.as_str(), deny);
                let Some(entry) = self.store.find_entry(&key).await? else {
                    continue;
                };
                match self.store.remove_permissions(entry.id, permissions).await? {
                    Some(entry) => {
                        tracing::info!(entry = %entry.key, permissions = ?entry.permission_names(), "revoked");
                        remaining.push(entry);
                    }
                    None => tracing::info!(entry = %key, "revoked, entry removed"),
                }
            }
            Ok::<_, AclError>(())
        }
        .await;

        self.invalidate(resource);
        result.map(|()| remaining)
    }

    /// Every entry on `resource`, deny entries first, each group in
    /// evaluation order.
    pub async fn entries(&self, resource: &ResourceKey) -> Result<Vec<Entry>> {
        self.store.entries_for(resource).await
    }

    /// Move an entry within its evaluation pass.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no entry exists for the tuple.
    pub async fn reorder(
        &self,
        resource: &ResourceKey,
        subject: &SubjectRef,
        mode: &str,
        deny: bool,
        sort_key: i64,
    ) -> Result<Entry> {
        let key = EntryKey::new(resource.clone(), subject.clone(), normalize(mode), deny);
        let entry = self
            .store
            .find_entry(&key)
            .await?
            .ok_or_else(|| AclError::not_found(format!("no entry for {key}")))?;
        let result = self.store.set_sort_key(entry.id, sort_key).await;
        self.invalidate(resource);
        let entry = result?;
        tracing::info!(entry = %entry.key, sort_key, "reordered");
        Ok(entry)
    }

    /// Delete every entry on `resource`.
    pub async fn clear(&self, resource: &ResourceKey) -> Result<usize> {
        let result = self.store.clear_resource(resource).await;
        self.invalidate(resource);
        let removed = result?;
        tracing::info!(resource = %resource, removed, "cleared");
        Ok(removed)
    }

    fn invalidate(&self, resource: &ResourceKey) {
        if let Some(cache) = &self.cache {
            cache.invalidate(resource);
        }
    }
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("store", &self.store.name())
            .field("subjects", &self.subjects)
            .field("resources", &self.resources)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
