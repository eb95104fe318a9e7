use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// "Principal plays Role within Business", toggled like a direct grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMembership {
    pub id: String,
    pub principal_id: String,
    pub role_id: String,
    pub business_id: String,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating or toggling a membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRoleMembershipRepoInput {
    pub id: String,
    pub principal_id: String,
    pub role_id: String,
    pub business_id: String,
    pub active: bool,
}

/// Input for listing a principal's memberships (active and inactive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRoleMembershipsRepoInput {
    pub principal_id: String,
}

/// Repository trait for role memberships
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleMembershipRepository: Send + Sync {
    /// Get-or-create the membership for the triple and set its `active` flag
    async fn set_role_membership(
        &self,
        input: SetRoleMembershipRepoInput,
    ) -> DomainResult<RoleMembership>;

    /// Apply every input or none: a failing entry leaves the store unchanged
    async fn set_role_memberships(
        &self,
        inputs: Vec<SetRoleMembershipRepoInput>,
    ) -> DomainResult<Vec<RoleMembership>>;

    async fn list_role_memberships(
        &self,
        input: ListRoleMembershipsRepoInput,
    ) -> DomainResult<Vec<RoleMembership>>;
}
