use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::auth::Action;
use crate::domain::{DomainResult, Principal, ResourceKind, ResourceNode, ResourceRef};

/// Business-scoped authorization decisions.
///
/// Ordinary denials (inactive principal, unknown capability, unresolved
/// business, inactive or excluded grants) come back as `Ok(false)` or an empty
/// set. `Err` is reserved for store failures.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Can `principal` perform `action` on this resource instance?
    async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &ResourceNode,
    ) -> DomainResult<bool>;

    /// Like `authorize`, starting from an HTTP verb; unknown verbs are denied
    async fn authorize_method(
        &self,
        principal: &Principal,
        method: &str,
        resource: &ResourceNode,
    ) -> DomainResult<bool>;

    /// Does `principal` hold `capability` inside `business_id`?
    async fn authorize_in_tenant(
        &self,
        principal: &Principal,
        capability: &str,
        business_id: &str,
    ) -> DomainResult<bool>;

    /// Would `action` on `kind` be allowed in at least one business?
    async fn authorizable(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<bool>;

    /// Businesses in which `action` on `kind` is allowed
    async fn accessible_tenants(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<BTreeSet<String>>;

    /// Resources of `kind` owned by an accessible business
    async fn accessible_resources(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<Vec<ResourceRef>>;
}
