use crate::domain::result::DomainResult;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Named bundle of global capabilities ("group")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<String>,
}

/// Hard veto: no membership in `role_id` ever confers `capability`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RoleExclusion {
    pub role_id: String,
    pub capability: String,
}

/// Input for creating a role with a generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRepoInput {
    pub id: String,
    pub name: String,
}

/// Input for getting a role by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRoleRepoInput {
    pub role_id: String,
}

/// Input for getting a role by its unique name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRoleByNameRepoInput {
    pub name: String,
}

/// Input for adding, removing or replacing a role's capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRoleCapabilitiesRepoInput {
    pub role_id: String,
    pub capabilities: Vec<String>,
}

/// Input for creating or deleting a role exclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleExclusionRepoInput {
    pub role_id: String,
    pub capability: String,
}

/// Input for listing a role's exclusions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRoleExclusionsRepoInput {
    pub role_id: String,
}

/// Repository trait for roles and their global capability sets.
///
/// `add_role_capabilities` and `set_role_capabilities` must run the exclusion
/// guard and the write in one atomic unit, failing with
/// `DomainError::ExclusionViolation` and leaving the role untouched when any
/// requested capability is excluded for the role.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create_role(&self, input: CreateRoleRepoInput) -> DomainResult<Role>;

    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>>;

    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>>;

    async fn list_roles(&self) -> DomainResult<Vec<Role>>;

    /// Add capabilities to the role's global set (guarded)
    async fn add_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role>;

    /// Remove capabilities from the role's global set
    async fn remove_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role>;

    /// Replace the role's global set (guarded against the new set)
    async fn set_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role>;
}

/// Repository trait for role exclusions
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RoleExclusionRepository: Send + Sync {
    /// Create an exclusion; creating an existing pair is a no-op
    async fn add_role_exclusion(&self, input: RoleExclusionRepoInput)
        -> DomainResult<RoleExclusion>;

    /// Delete an exclusion, returning whether it existed
    async fn remove_role_exclusion(&self, input: RoleExclusionRepoInput) -> DomainResult<bool>;

    async fn list_role_exclusions(
        &self,
        input: ListRoleExclusionsRepoInput,
    ) -> DomainResult<Vec<RoleExclusion>>;
}
