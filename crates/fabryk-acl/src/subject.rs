//! Actors, subject resolvers, and the subject registry.
//!
//! A subject resolver owns one identity namespace (e.g. `account`). It
//! validates identifier strings supplied by administrators and decides, at
//! evaluation time, whether a runtime [`Actor`] is the subject stored in an
//! entry. Several resolvers may recognise the same actor: a named account is
//! also covered by the universal `basic:everyone` subject.
//!
//! # Resolvers
//!
//! - [`EveryoneResolver`]: the universal subject, matches every actor
//! - [`DirectoryResolver`]: named identities checked against a [`SubjectDirectory`]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AclError, Result, SubjectRejection, SubjectRejectionReason};
use crate::types::SubjectRef;

/// Default namespace of the universal subject.
pub const UNIVERSAL_NAMESPACE: &str = "basic";

/// Default identifier of the universal subject.
pub const UNIVERSAL_IDENTIFIER: &str = "everyone";

// ============================================================================
// Actor
// ============================================================================

/// The runtime value on whose behalf access is checked.
pub trait Actor: Send + Sync {
    /// Stable identifier of this actor, used to key cached decisions.
    fn actor_id(&self) -> &str;

    /// The identifier this actor holds in `namespace`, if any.
    fn identity(&self, namespace: &str) -> Option<&str>;
}

/// A plain actor with a fixed set of namespace identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    identities: BTreeMap<String, String>,
}

impl Principal {
    /// Create an actor with no identities; it is still covered by the
    /// universal subject.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identities: BTreeMap::new(),
        }
    }

    /// Shorthand for an actor whose id is `"{namespace}:{identifier}"` and
    /// who holds that one identity.
    pub fn named(namespace: &str, identifier: &str) -> Self {
        Self::new(format!("{}:{identifier}", namespace.to_lowercase()))
            .with_identity(namespace, identifier)
    }

    /// Add an identity in `namespace`.
    pub fn with_identity(mut self, namespace: &str, identifier: impl Into<String>) -> Self {
        self.identities
            .insert(namespace.to_lowercase(), identifier.into());
        self
    }
}

impl Actor for Principal {
    fn actor_id(&self) -> &str {
        &self.id
    }

    fn identity(&self, namespace: &str) -> Option<&str> {
        self.identities.get(namespace).map(String::as_str)
    }
}

// ============================================================================
// SubjectResolver
// ============================================================================

/// Capability interface for one subject namespace.
#[async_trait]
pub trait SubjectResolver: Send + Sync {
    /// The namespace this resolver is registered under.
    fn namespace(&self) -> &str;

    /// Validate an identifier and return its canonical subject.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the identifier is not known.
    async fn validate(&self, identifier: &str) -> std::result::Result<SubjectRef, String>;

    /// Whether this resolver applies to `actor` at all.
    fn can_handle(&self, actor: &dyn Actor) -> bool;

    /// Whether `actor` is the subject stored in an entry.
    fn matches(&self, actor: &dyn Actor, stored: &SubjectRef) -> bool;
}

/// The universal subject: handles and matches every actor.
#[derive(Debug, Clone)]
pub struct EveryoneResolver {
    namespace: String,
    identifier: String,
}

impl EveryoneResolver {
    /// Create a resolver for `namespace:identifier`.
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into().to_lowercase(),
            identifier: identifier.into().to_lowercase(),
        }
    }

    /// The universal subject reference.
    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(&self.namespace, &self.identifier)
    }
}

impl Default for EveryoneResolver {
    fn default() -> Self {
        Self::new(UNIVERSAL_NAMESPACE, UNIVERSAL_IDENTIFIER)
    }
}

#[async_trait]
impl SubjectResolver for EveryoneResolver {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn validate(&self, identifier: &str) -> std::result::Result<SubjectRef, String> {
        if identifier.trim().to_lowercase() == self.identifier {
            Ok(self.subject())
        } else {
            Err(format!(
                "only `{}` is valid in namespace `{}`",
                self.identifier, self.namespace
            ))
        }
    }

    fn can_handle(&self, _actor: &dyn Actor) -> bool {
        true
    }

    fn matches(&self, _actor: &dyn Actor, _stored: &SubjectRef) -> bool {
        true
    }
}

// ============================================================================
// Directory-backed resolver
// ============================================================================

/// Lookup of known identities in one namespace, supplied by the host.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// Return the canonical spelling of `identifier`, or `None` if unknown.
    async fn lookup(&self, identifier: &str) -> Result<Option<String>>;
}

/// In-memory directory of identifiers, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    // lowercased -> canonical
    names: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(|n| {
                let n = n.into();
                (n.to_lowercase(), n)
            })
            .collect();
        Self { names }
    }

    /// Add an identifier.
    pub fn insert(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.names.insert(name.to_lowercase(), name);
    }
}

#[async_trait]
impl SubjectDirectory for StaticDirectory {
    async fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self.names.get(&identifier.trim().to_lowercase()).cloned())
    }
}

/// Named identities in one namespace (accounts, characters, ...).
///
/// An actor is handled when it holds an identity in the namespace and
/// matches a stored subject when that identity equals the stored
/// identifier, ignoring case.
pub struct DirectoryResolver {
    namespace: String,
    directory: Arc<dyn SubjectDirectory>,
}

impl DirectoryResolver {
    pub fn new(namespace: impl Into<String>, directory: Arc<dyn SubjectDirectory>) -> Self {
        Self {
            namespace: namespace.into().to_lowercase(),
            directory,
        }
    }
}

impl std::fmt::Debug for DirectoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryResolver")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SubjectResolver for DirectoryResolver {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn validate(&self, identifier: &str) -> std::result::Result<SubjectRef, String> {
        match self.directory.lookup(identifier).await {
            Ok(Some(canonical)) => Ok(SubjectRef::new(&self.namespace, canonical)),
            Ok(None) => Err(format!("no {} named `{}`", self.namespace, identifier.trim())),
            Err(e) => Err(format!("{} lookup failed: {e}", self.namespace)),
        }
    }

    fn can_handle(&self, actor: &dyn Actor) -> bool {
        actor.identity(&self.namespace).is_some()
    }

    fn matches(&self, actor: &dyn Actor, stored: &SubjectRef) -> bool {
        actor
            .identity(&self.namespace)
            .is_some_and(|id| id.to_lowercase() == stored.identifier.to_lowercase())
    }
}

// ============================================================================
// SubjectRegistry
// ============================================================================

/// Namespace → resolver map, populated once at startup.
#[derive(Default, Clone)]
pub struct SubjectRegistry {
    resolvers: HashMap<String, Arc<dyn SubjectResolver>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under its namespace.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the namespace is already taken.
    pub fn register(&mut self, resolver: Arc<dyn SubjectResolver>) -> Result<()> {
        let namespace = resolver.namespace().to_lowercase();
        if self.resolvers.contains_key(&namespace) {
            return Err(AclError::config(format!(
                "subject namespace `{namespace}` is already registered"
            )));
        }
        tracing::debug!(namespace = %namespace, "registered subject resolver");
        self.resolvers.insert(namespace, resolver);
        Ok(())
    }

    /// The resolver for `namespace`.
    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn SubjectResolver>> {
        self.resolvers.get(&namespace.to_lowercase())
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> BTreeSet<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolvers that apply to `actor`, in namespace order.
    pub fn handling(&self, actor: &dyn Actor) -> Vec<&Arc<dyn SubjectResolver>> {
        let mut handling: Vec<(&String, &Arc<dyn SubjectResolver>)> = self
            .resolvers
            .iter()
            .filter(|(_, r)| r.can_handle(actor))
            .collect();
        handling.sort_by(|a, b| a.0.cmp(b.0));
        handling.into_iter().map(|(_, r)| r).collect()
    }

    /// Parse and validate one `namespace:identifier` token.
    pub async fn parse(&self, token: &str) -> std::result::Result<SubjectRef, SubjectRejection> {
        let Some(raw) = SubjectRef::parse(token) else {
            return Err(SubjectRejection::new(token, SubjectRejectionReason::Malformed));
        };
        let Some(resolver) = self.get(&raw.namespace) else {
            return Err(SubjectRejection::new(
                token,
                SubjectRejectionReason::UnknownNamespace(raw.namespace),
            ));
        };
        resolver
            .validate(&raw.identifier)
            .await
            .map_err(|reason| SubjectRejection::new(token, SubjectRejectionReason::Unresolved(reason)))
    }

    /// Validate every token, collecting all failures.
    ///
    /// Duplicate subjects are returned once, in first-seen order.
    pub async fn parse_all<S: AsRef<str>>(
        &self,
        tokens: &[S],
    ) -> (Vec<SubjectRef>, Vec<SubjectRejection>) {
        let mut subjects = Vec::with_capacity(tokens.len());
        let mut rejected = Vec::new();
        for token in tokens {
            match self.parse(token.as_ref()).await {
                Ok(subject) => {
                    if !subjects.contains(&subject) {
                        subjects.push(subject);
                    }
                }
                Err(rejection) => rejected.push(rejection),
            }
        }
        (subjects, rejected)
    }
}

impl std::fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SubjectRegistry {
        let mut registry = SubjectRegistry::new();
        registry
            .register(Arc::new(EveryoneResolver::default()))
            .unwrap();
        let accounts = StaticDirectory::new(["Jane", "bob"]);
        registry
            .register(Arc::new(DirectoryResolver::new("account", Arc::new(accounts))))
            .unwrap();
        registry
    }

    #[test]
    fn test_principal_identities() {
        let p = Principal::named("Account", "bob");
        assert_eq!(p.actor_id(), "account:bob");
        assert_eq!(p.identity("account"), Some("bob"));
        assert_eq!(p.identity("character"), None);
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(EveryoneResolver::default()))
            .unwrap_err();
        assert!(matches!(err, AclError::Config(_)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_handling_includes_everyone() {
        let registry = registry();
        let bob = Principal::named("account", "bob");
        let namespaces: Vec<&str> = registry
            .handling(&bob)
            .iter()
            .map(|r| r.namespace())
            .collect();
        assert_eq!(namespaces, vec!["account", "basic"]);

        let guest = Principal::new("guest-1");
        let namespaces: Vec<&str> = registry
            .handling(&guest)
            .iter()
            .map(|r| r.namespace())
            .collect();
        assert_eq!(namespaces, vec!["basic"]);
    }

    #[tokio::test]
    async fn test_parse_canonicalises() {
        let registry = registry();
        let s = registry.parse("account:JANE").await.unwrap();
        assert_eq!(s, SubjectRef::new("account", "Jane"));

        let e = registry.parse("Basic:Everyone").await.unwrap();
        assert_eq!(e.to_string(), "basic:everyone");
    }

    #[tokio::test]
    async fn test_parse_failures() {
        let registry = registry();

        let malformed = registry.parse("jane").await.unwrap_err();
        assert_eq!(malformed.reason, SubjectRejectionReason::Malformed);

        let unknown = registry.parse("guild:red").await.unwrap_err();
        assert_eq!(
            unknown.reason,
            SubjectRejectionReason::UnknownNamespace("guild".into())
        );

        let unresolved = registry.parse("account:nobody").await.unwrap_err();
        assert!(matches!(
            unresolved.reason,
            SubjectRejectionReason::Unresolved(_)
        ));

        let not_everyone = registry.parse("basic:someone").await.unwrap_err();
        assert!(matches!(
            not_everyone.reason,
            SubjectRejectionReason::Unresolved(_)
        ));
    }

    #[tokio::test]
    async fn test_parse_all_collects_every_failure() {
        let registry = registry();
        let (subjects, rejected) = registry
            .parse_all(&["account:bob", "bad", "guild:x", "account:ghost", "account:BOB"])
            .await;
        assert_eq!(subjects, vec![SubjectRef::new("account", "bob")]);
        let tokens: Vec<&str> = rejected.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["bad", "guild:x", "account:ghost"]);
    }

    #[test]
    fn test_directory_matches_case_insensitively() {
        let resolver = DirectoryResolver::new("account", Arc::new(StaticDirectory::default()));
        let bob = Principal::named("account", "Bob");
        assert!(resolver.can_handle(&bob));
        assert!(resolver.matches(&bob, &SubjectRef::new("account", "bob")));
        assert!(!resolver.matches(&bob, &SubjectRef::new("account", "jane")));
    }

    #[tokio::test]
    async fn test_directory_matches_non_ascii_identifiers() {
        let resolver =
            DirectoryResolver::new("account", Arc::new(StaticDirectory::new(["Ärger"])));
        let stored = resolver.validate("ärger").await.unwrap();
        assert_eq!(stored.identifier, "Ärger");

        let lower = Principal::named("account", "ärger");
        let upper = Principal::named("account", "ÄRGER");
        assert!(resolver.matches(&lower, &stored));
        assert!(resolver.matches(&upper, &stored));
        assert!(!resolver.matches(&Principal::named("account", "arger"), &stored));
    }

    #[test]
    fn test_everyone_matches_anything() {
        let resolver = EveryoneResolver::default();
        let anyone = Principal::new("x");
        assert!(resolver.can_handle(&anyone));
        assert!(resolver.matches(&anyone, &resolver.subject()));
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn SubjectResolver) {}
        fn _assert_actor_object_safe(_: &dyn Actor) {}
    }
}
