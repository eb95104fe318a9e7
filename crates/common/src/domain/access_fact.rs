use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Input for loading the facts one authorization decision needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAccessFactsRepoInput {
    pub principal_id: String,
    pub capability: String,
    /// Restrict facts to one business; `None` loads facts for every business
    pub business_id: Option<String>,
}

/// An active membership of the principal, annotated for one capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantFact {
    pub business_id: String,
    pub role_id: String,
    /// The capability is in the role's global set
    pub role_has_capability: bool,
    /// A RoleExclusion(role, capability) exists
    pub excluded: bool,
}

/// Snapshot of grants relevant to (principal, capability).
///
/// Inactive grants and memberships are never part of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFacts {
    /// The capability exists in the catalog
    pub capability_exists: bool,
    /// Businesses with an active direct grant for the capability
    pub direct_grants: Vec<String>,
    pub role_grants: Vec<RoleGrantFact>,
}

/// Read side of the grant and exclusion stores used by the authorization engine.
///
/// Each call must read from a single consistent snapshot.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccessFactRepository: Send + Sync {
    async fn load_access_facts(&self, input: LoadAccessFactsRepoInput) -> DomainResult<AccessFacts>;

    /// IDs of every business
    async fn list_tenant_ids(&self) -> DomainResult<Vec<String>>;
}
