use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::auth::{capability_for, Action, AuthorizationProvider};
use common::domain::{
    DirectGrant, DirectGrantRepository, DomainError, DomainResult, ListDirectGrantsRepoInput,
    ListRoleExclusionsRepoInput, ListRoleMembershipsRepoInput, Principal, ResourceKind, Role,
    RoleExclusion, RoleExclusionRepoInput, RoleExclusionRepository, RoleMembership,
    RoleMembershipRepository, RoleRepository, SetDirectGrantRepoInput,
    SetRoleMembershipRepoInput, UpdateRoleCapabilitiesRepoInput,
};
use common::garde::{capability_codename, capability_codenames, validate_struct};
use garde::Validate;
use tracing::{debug, instrument};

// ============================================================================
// Service Request Types
// ============================================================================
// Each request carries the acting principal for authorization

/// Request to grant or revoke one capability for a principal in a business
#[derive(Debug, Clone, Validate)]
pub struct SetDirectGrantRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub principal_id: String,
    #[garde(length(min = 1))]
    pub business_id: String,
    #[garde(custom(capability_codename))]
    pub capability: String,
    #[garde(skip)]
    pub active: bool,
}

/// Request to activate or deactivate a role membership in a business
#[derive(Debug, Clone, Validate)]
pub struct SetRoleMembershipRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub principal_id: String,
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(length(min = 1))]
    pub business_id: String,
    #[garde(skip)]
    pub active: bool,
}

/// Request to apply `business -> capability -> active` for a principal
#[derive(Debug, Clone, Validate)]
pub struct SetDirectGrantsRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub principal_id: String,
    #[garde(skip)]
    pub grants: BTreeMap<String, BTreeMap<String, bool>>,
}

/// Request to apply `business -> role -> active` for a principal
#[derive(Debug, Clone, Validate)]
pub struct SetRoleMembershipsRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub principal_id: String,
    #[garde(skip)]
    pub memberships: BTreeMap<String, BTreeMap<String, bool>>,
}

/// Request to add, remove or replace a role's global capabilities
#[derive(Debug, Clone, Validate)]
pub struct UpdateRoleCapabilitiesRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(capability_codenames))]
    pub capabilities: Vec<String>,
}

/// Request to create or delete a role exclusion
#[derive(Debug, Clone, Validate)]
pub struct RoleExclusionRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub role_id: String,
    #[garde(custom(capability_codename))]
    pub capability: String,
}

/// Request to list a role's exclusions
#[derive(Debug, Clone, Validate)]
pub struct ListRoleExclusionsRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub role_id: String,
}

/// Request to audit a principal's grants and memberships
#[derive(Debug, Clone, Validate)]
pub struct AuditPrincipalAccessRequest {
    #[garde(skip)]
    pub actor: Principal,
    #[garde(length(min = 1))]
    pub principal_id: String,
}

/// Every grant and membership of a principal, inactive rows included
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalAccessAudit {
    pub direct_grants: Vec<DirectGrant>,
    pub memberships: Vec<RoleMembership>,
}

/// Domain service for administering who may do what in which business
pub struct AccessAdminService {
    roles: Arc<dyn RoleRepository>,
    exclusions: Arc<dyn RoleExclusionRepository>,
    grants: Arc<dyn DirectGrantRepository>,
    memberships: Arc<dyn RoleMembershipRepository>,
    authorization_provider: Arc<dyn AuthorizationProvider>,
}

impl AccessAdminService {
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        exclusions: Arc<dyn RoleExclusionRepository>,
        grants: Arc<dyn DirectGrantRepository>,
        memberships: Arc<dyn RoleMembershipRepository>,
        authorization_provider: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        Self {
            roles,
            exclusions,
            grants,
            memberships,
            authorization_provider,
        }
    }

    /// Managing a principal's access in a business requires `change_user` there
    async fn require_user_admin(&self, actor: &Principal, business_id: &str) -> DomainResult<()> {
        let capability = capability_for(ResourceKind::User, Action::Change);
        if self
            .authorization_provider
            .authorize_in_tenant(actor, &capability, business_id)
            .await?
        {
            return Ok(());
        }
        Err(DomainError::PermissionDenied(format!(
            "{} lacks {capability} in business {business_id}",
            actor.id
        )))
    }

    /// Role capability sets are global, so `action` on groups in any business suffices
    async fn require_group_admin(&self, actor: &Principal, action: Action) -> DomainResult<()> {
        if self
            .authorization_provider
            .authorizable(actor, action, ResourceKind::Group)
            .await?
        {
            return Ok(());
        }
        Err(DomainError::PermissionDenied(format!(
            "{} may not {} groups",
            actor.id,
            action.as_str()
        )))
    }

    fn require_superuser(actor: &Principal) -> DomainResult<()> {
        if actor.active && actor.superuser {
            return Ok(());
        }
        Err(DomainError::PermissionDenied(format!(
            "{} is not a superuser",
            actor.id
        )))
    }

    /// Create or toggle one direct grant
    #[instrument(skip(self, request), fields(actor = %request.actor.id, principal_id = %request.principal_id, business_id = %request.business_id, capability = %request.capability, active = request.active))]
    pub async fn set_direct_grant(&self, request: SetDirectGrantRequest) -> DomainResult<DirectGrant> {
        validate_struct(&request)?;
        self.require_user_admin(&request.actor, &request.business_id)
            .await?;

        let grant = self
            .grants
            .set_direct_grant(SetDirectGrantRepoInput {
                id: xid::new().to_string(),
                principal_id: request.principal_id,
                business_id: request.business_id,
                capability: request.capability,
                active: request.active,
            })
            .await?;

        debug!(grant_id = %grant.id, "direct grant set");
        Ok(grant)
    }

    /// Create or toggle one role membership
    #[instrument(skip(self, request), fields(actor = %request.actor.id, principal_id = %request.principal_id, role_id = %request.role_id, business_id = %request.business_id, active = request.active))]
    pub async fn set_role_membership(
        &self,
        request: SetRoleMembershipRequest,
    ) -> DomainResult<RoleMembership> {
        validate_struct(&request)?;
        self.require_user_admin(&request.actor, &request.business_id)
            .await?;

        let membership = self
            .memberships
            .set_role_membership(SetRoleMembershipRepoInput {
                id: xid::new().to_string(),
                principal_id: request.principal_id,
                role_id: request.role_id,
                business_id: request.business_id,
                active: request.active,
            })
            .await?;

        debug!(membership_id = %membership.id, "role membership set");
        Ok(membership)
    }

    /// Apply a whole `business -> capability -> active` map.
    ///
    /// Authorization is checked for every business before anything is written,
    /// and the store applies the entries all together or not at all.
    #[instrument(skip(self, request), fields(actor = %request.actor.id, principal_id = %request.principal_id, businesses = request.grants.len()))]
    pub async fn set_direct_grants(
        &self,
        request: SetDirectGrantsRequest,
    ) -> DomainResult<Vec<DirectGrant>> {
        validate_struct(&request)?;
        validate_map(&request.grants, |capability| {
            capability_codename(capability, &()).is_ok()
        })?;

        for business_id in request.grants.keys() {
            self.require_user_admin(&request.actor, business_id).await?;
        }

        let principal_id = request.principal_id;
        let inputs: Vec<SetDirectGrantRepoInput> = request
            .grants
            .into_iter()
            .flat_map(|(business_id, capabilities)| {
                let principal_id = principal_id.clone();
                capabilities
                    .into_iter()
                    .map(move |(capability, active)| SetDirectGrantRepoInput {
                        id: xid::new().to_string(),
                        principal_id: principal_id.clone(),
                        business_id: business_id.clone(),
                        capability,
                        active,
                    })
            })
            .collect();

        let applied = self.grants.set_direct_grants(inputs).await?;
        debug!(count = applied.len(), "direct grants applied");
        Ok(applied)
    }

    /// Apply a whole `business -> role -> active` map, authorizing every business first.
    ///
    /// Entries are applied all together or not at all.
    #[instrument(skip(self, request), fields(actor = %request.actor.id, principal_id = %request.principal_id, businesses = request.memberships.len()))]
    pub async fn set_role_memberships(
        &self,
        request: SetRoleMembershipsRequest,
    ) -> DomainResult<Vec<RoleMembership>> {
        validate_struct(&request)?;
        validate_map(&request.memberships, |role_id| !role_id.is_empty())?;

        for business_id in request.memberships.keys() {
            self.require_user_admin(&request.actor, business_id).await?;
        }

        let principal_id = request.principal_id;
        let inputs: Vec<SetRoleMembershipRepoInput> = request
            .memberships
            .into_iter()
            .flat_map(|(business_id, roles)| {
                let principal_id = principal_id.clone();
                roles
                    .into_iter()
                    .map(move |(role_id, active)| SetRoleMembershipRepoInput {
                        id: xid::new().to_string(),
                        principal_id: principal_id.clone(),
                        role_id,
                        business_id: business_id.clone(),
                        active,
                    })
            })
            .collect();

        let applied = self.memberships.set_role_memberships(inputs).await?;
        debug!(count = applied.len(), "role memberships applied");
        Ok(applied)
    }

    /// Add capabilities to a role; fails with `ExclusionViolation` if any is excluded
    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id))]
    pub async fn add_role_capabilities(
        &self,
        request: UpdateRoleCapabilitiesRequest,
    ) -> DomainResult<Role> {
        validate_struct(&request)?;
        self.require_group_admin(&request.actor, Action::Change)
            .await?;

        self.roles
            .add_role_capabilities(UpdateRoleCapabilitiesRepoInput {
                role_id: request.role_id,
                capabilities: request.capabilities,
            })
            .await
    }

    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id))]
    pub async fn remove_role_capabilities(
        &self,
        request: UpdateRoleCapabilitiesRequest,
    ) -> DomainResult<Role> {
        validate_struct(&request)?;
        self.require_group_admin(&request.actor, Action::Change)
            .await?;

        self.roles
            .remove_role_capabilities(UpdateRoleCapabilitiesRepoInput {
                role_id: request.role_id,
                capabilities: request.capabilities,
            })
            .await
    }

    /// Replace a role's capabilities; guarded like additions
    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id))]
    pub async fn set_role_capabilities(
        &self,
        request: UpdateRoleCapabilitiesRequest,
    ) -> DomainResult<Role> {
        validate_struct(&request)?;
        self.require_group_admin(&request.actor, Action::Change)
            .await?;

        self.roles
            .set_role_capabilities(UpdateRoleCapabilitiesRepoInput {
                role_id: request.role_id,
                capabilities: request.capabilities,
            })
            .await
    }

    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id, capability = %request.capability))]
    pub async fn add_role_exclusion(
        &self,
        request: RoleExclusionRequest,
    ) -> DomainResult<RoleExclusion> {
        validate_struct(&request)?;
        Self::require_superuser(&request.actor)?;

        self.exclusions
            .add_role_exclusion(RoleExclusionRepoInput {
                role_id: request.role_id,
                capability: request.capability,
            })
            .await
    }

    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id, capability = %request.capability))]
    pub async fn remove_role_exclusion(&self, request: RoleExclusionRequest) -> DomainResult<bool> {
        validate_struct(&request)?;
        Self::require_superuser(&request.actor)?;

        self.exclusions
            .remove_role_exclusion(RoleExclusionRepoInput {
                role_id: request.role_id,
                capability: request.capability,
            })
            .await
    }

    #[instrument(skip(self, request), fields(actor = %request.actor.id, role_id = %request.role_id))]
    pub async fn list_role_exclusions(
        &self,
        request: ListRoleExclusionsRequest,
    ) -> DomainResult<Vec<RoleExclusion>> {
        validate_struct(&request)?;
        self.require_group_admin(&request.actor, Action::View)
            .await?;

        self.exclusions
            .list_role_exclusions(ListRoleExclusionsRepoInput {
                role_id: request.role_id,
            })
            .await
    }

    /// List a principal's grants and memberships, inactive rows included.
    ///
    /// Only rows in businesses where the actor may view users are returned.
    #[instrument(skip(self, request), fields(actor = %request.actor.id, principal_id = %request.principal_id))]
    pub async fn audit_principal_access(
        &self,
        request: AuditPrincipalAccessRequest,
    ) -> DomainResult<PrincipalAccessAudit> {
        validate_struct(&request)?;

        let visible: BTreeSet<String> = self
            .authorization_provider
            .accessible_tenants(&request.actor, Action::View, ResourceKind::User)
            .await?;

        let direct_grants = self
            .grants
            .list_direct_grants(ListDirectGrantsRepoInput {
                principal_id: request.principal_id.clone(),
            })
            .await?
            .into_iter()
            .filter(|grant| visible.contains(&grant.business_id))
            .collect();

        let memberships = self
            .memberships
            .list_role_memberships(ListRoleMembershipsRepoInput {
                principal_id: request.principal_id,
            })
            .await?
            .into_iter()
            .filter(|membership| visible.contains(&membership.business_id))
            .collect();

        let audit = PrincipalAccessAudit {
            direct_grants,
            memberships,
        };
        debug!(
            grants = audit.direct_grants.len(),
            memberships = audit.memberships.len(),
            "audited principal access"
        );
        Ok(audit)
    }
}

/// Check the keys of a bulk `business -> key -> active` map
fn validate_map(
    entries: &BTreeMap<String, BTreeMap<String, bool>>,
    key_is_valid: impl Fn(&str) -> bool,
) -> DomainResult<()> {
    for (business_id, inner) in entries {
        if business_id.is_empty() {
            return Err(DomainError::ValidationError(
                "business_id: length is lower than 1".to_string(),
            ));
        }
        if let Some(bad) = inner.keys().find(|key| !key_is_valid(key.as_str())) {
            return Err(DomainError::ValidationError(format!(
                "{business_id}: invalid entry {bad:?}"
            )));
        }
    }
    Ok(())
}
