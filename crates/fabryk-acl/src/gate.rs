//! Administrative gate for ACL edits.
//!
//! Before an actor may change a resource's entries, the host decides whether
//! that actor is allowed to administer the resource at all
//! ([`ModifyPolicy`]). Only then are the supplied subject and permission
//! strings validated. A gate failure never writes anything.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{AccessEngine, Validated};
use crate::error::{AclError, Result};
use crate::resource::Resource;
use crate::subject::Actor;
use crate::types::Entry;

// ============================================================================
// ModifyPolicy
// ============================================================================

/// Host callback deciding who may edit a resource's ACL.
#[async_trait]
pub trait ModifyPolicy: Send + Sync {
    async fn can_modify(&self, actor: &dyn Actor, resource: &dyn Resource) -> bool;
}

/// Lets every actor edit every ACL.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ModifyPolicy for AllowAll {
    async fn can_modify(&self, _actor: &dyn Actor, _resource: &dyn Resource) -> bool {
        true
    }
}

/// Policy backed by a synchronous predicate.
pub struct FnPolicy<F>(F);

impl<F> FnPolicy<F>
where
    F: Fn(&dyn Actor, &dyn Resource) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self(predicate)
    }
}

#[async_trait]
impl<F> ModifyPolicy for FnPolicy<F>
where
    F: Fn(&dyn Actor, &dyn Resource) -> bool + Send + Sync,
{
    async fn can_modify(&self, actor: &dyn Actor, resource: &dyn Resource) -> bool {
        (self.0)(actor, resource)
    }
}

// ============================================================================
// AuthorizationGate
// ============================================================================

/// Checks [`ModifyPolicy`] and validates input before handing edits to the
/// engine.
pub struct AuthorizationGate {
    engine: Arc<AccessEngine>,
    policy: Arc<dyn ModifyPolicy>,
}

impl AuthorizationGate {
    pub fn new(engine: Arc<AccessEngine>, policy: Arc<dyn ModifyPolicy>) -> Self {
        Self { engine, policy }
    }

    pub fn engine(&self) -> &Arc<AccessEngine> {
        &self.engine
    }

    async fn authorize(&self, actor: &dyn Actor, resource: &dyn Resource) -> Result<()> {
        if self.policy.can_modify(actor, resource).await {
            return Ok(());
        }
        let key = resource.resource_key();
        tracing::warn!(actor = actor.actor_id(), resource = %key, "acl edit refused");
        Err(AclError::permission_denied(actor.actor_id(), key.to_string()))
    }

    /// Authorize `actor` and validate every subject and permission token.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the policy refuses, otherwise
    /// [`AclError::Rejected`] listing every invalid token.
    pub async fn start<S, P>(
        &self,
        actor: &dyn Actor,
        resource: &dyn Resource,
        subjects: &[S],
        permissions: &[P],
    ) -> Result<Validated>
    where
        S: AsRef<str> + Sync,
        P: AsRef<str> + Sync,
    {
        self.authorize(actor, resource).await?;
        self.engine
            .validate(resource, subjects, permissions)
            .await
            .inspect_err(|e| log_rejected(actor, resource, e))
    }

    /// Authorize, then [`AccessEngine::add`].
    pub async fn add<S, P>(
        &self,
        actor: &dyn Actor,
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
        self.authorize(actor, resource).await?;
        self.engine
            .add(resource, subjects, permissions, mode, deny)
            .await
            .inspect_err(|e| log_rejected(actor, resource, e))
    }

    /// Authorize, then [`AccessEngine::remove`].
    pub async fn remove<S, P>(
        &self,
        actor: &dyn Actor,
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
        self.authorize(actor, resource).await?;
        self.engine
            .remove(resource, subjects, permissions, mode, deny)
            .await
            .inspect_err(|e| log_rejected(actor, resource, e))
    }
}

fn log_rejected(actor: &dyn Actor, resource: &dyn Resource, error: &AclError) {
    if let Some(rejections) = error.rejections() {
        tracing::warn!(
            actor = actor.actor_id(),
            resource = %resource.resource_key(),
            rejected = rejections.len(),
            "acl edit rejected: {rejections}"
        );
    }
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
