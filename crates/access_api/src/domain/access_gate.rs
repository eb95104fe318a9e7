use std::collections::BTreeSet;
use std::sync::Arc;

use common::auth::{Action, AuthorizationProvider};
use common::domain::{
    DomainError, DomainResult, Principal, Resource, ResourceKind, ResourceNode, ResourceRef,
};
use tracing::{debug, instrument};

/// How a denied instance check surfaces at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenialPolicy {
    /// Report the denial (403-style)
    #[default]
    Forbidden,
    /// Hide the instance's existence (404-style)
    NotFound,
}

/// Turns authorization decisions into errors for the CRUD layer
#[derive(Clone)]
pub struct AccessGate {
    authorization_provider: Arc<dyn AuthorizationProvider>,
    policy: DenialPolicy,
}

impl AccessGate {
    pub fn new(authorization_provider: Arc<dyn AuthorizationProvider>, policy: DenialPolicy) -> Self {
        Self {
            authorization_provider,
            policy,
        }
    }

    pub fn policy(&self) -> DenialPolicy {
        self.policy
    }

    fn deny(&self, principal: &Principal, what: String) -> DomainError {
        match self.policy {
            DenialPolicy::Forbidden => {
                DomainError::PermissionDenied(format!("{} may not {}", principal.id, what))
            }
            DenialPolicy::NotFound => DomainError::ResourceNotFound(what),
        }
    }

    /// Require `action` on one instance
    #[instrument(skip(self, principal, resource), fields(principal_id = %principal.id, action = action.as_str(), resource = %resource.reference))]
    pub async fn require(
        &self,
        principal: &Principal,
        action: Action,
        resource: &ResourceNode,
    ) -> DomainResult<()> {
        if self
            .authorization_provider
            .authorize(principal, action, resource)
            .await?
        {
            return Ok(());
        }

        debug!(policy = ?self.policy, "access denied");
        Err(self.deny(principal, format!("{} {}", action.as_str(), resource.reference)))
    }

    /// Require `action` on any domain entity
    pub async fn require_resource<R: Resource>(
        &self,
        principal: &Principal,
        action: Action,
        resource: &R,
    ) -> DomainResult<()> {
        let node = resource.node();
        self.require(principal, action, &node).await
    }

    /// Require the action an HTTP-style method maps to; unknown methods are denied
    #[instrument(skip(self, principal, resource), fields(principal_id = %principal.id, resource = %resource.reference))]
    pub async fn require_method(
        &self,
        principal: &Principal,
        method: &str,
        resource: &ResourceNode,
    ) -> DomainResult<()> {
        if self
            .authorization_provider
            .authorize_method(principal, method, resource)
            .await?
        {
            return Ok(());
        }

        debug!(policy = ?self.policy, "access denied");
        Err(self.deny(principal, format!("{method} {}", resource.reference)))
    }

    /// Require a capability inside one business, independent of any instance
    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn require_in_tenant(
        &self,
        principal: &Principal,
        capability: &str,
        business_id: &str,
    ) -> DomainResult<()> {
        if self
            .authorization_provider
            .authorize_in_tenant(principal, capability, business_id)
            .await?
        {
            return Ok(());
        }

        debug!("capability not held in business");
        Err(DomainError::PermissionDenied(format!(
            "{} lacks {capability} in business {business_id}",
            principal.id
        )))
    }

    /// Require `action` on `kind` in at least one business.
    ///
    /// There is no instance to hide here, so this always reports `PermissionDenied`.
    #[instrument(skip(self, principal), fields(principal_id = %principal.id, action = action.as_str(), kind = kind.as_str()))]
    pub async fn require_authorizable(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<()> {
        if self
            .authorization_provider
            .authorizable(principal, action, kind)
            .await?
        {
            return Ok(());
        }

        debug!("no business grants the action");
        Err(DomainError::PermissionDenied(format!(
            "{} may not {} any {kind}",
            principal.id,
            action.as_str()
        )))
    }

    /// Instances of `kind` a list endpoint may return
    pub async fn scope_list(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<Vec<ResourceRef>> {
        self.authorization_provider
            .accessible_resources(principal, action, kind)
            .await
    }

    /// Business ids a list endpoint may filter on
    pub async fn scope_tenants(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<BTreeSet<String>> {
        self.authorization_provider
            .accessible_tenants(principal, action, kind)
            .await
    }
}
