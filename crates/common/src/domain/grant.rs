use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Explicit principal -> business -> capability grant.
///
/// Rows are never deleted by administration; `active` is toggled instead so
/// the history stays queryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectGrant {
    pub id: String,
    pub principal_id: String,
    pub business_id: String,
    pub capability: String,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating or toggling a direct grant.
///
/// `id` is only used when the (principal, business, capability) triple does
/// not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDirectGrantRepoInput {
    pub id: String,
    pub principal_id: String,
    pub business_id: String,
    pub capability: String,
    pub active: bool,
}

/// Input for listing a principal's direct grants (active and inactive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDirectGrantsRepoInput {
    pub principal_id: String,
}

/// Repository trait for direct grants
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DirectGrantRepository: Send + Sync {
    /// Get-or-create the grant for the triple and set its `active` flag
    async fn set_direct_grant(&self, input: SetDirectGrantRepoInput) -> DomainResult<DirectGrant>;

    /// Apply every input or none: a failing entry leaves the store unchanged
    async fn set_direct_grants(
        &self,
        inputs: Vec<SetDirectGrantRepoInput>,
    ) -> DomainResult<Vec<DirectGrant>>;

    async fn list_direct_grants(
        &self,
        input: ListDirectGrantsRepoInput,
    ) -> DomainResult<Vec<DirectGrant>>;
}
