use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::auth::{enforce_exclusions, resolve_owner};
use crate::domain::{
    AccessFactRepository, AccessFacts, Business, BusinessRepository, Capability,
    CapabilityRepository, CreateBusinessRepoInput, CreatePrincipalRepoInput, CreateRoleRepoInput,
    DirectGrant, DirectGrantRepository, DomainError, DomainResult, GetBusinessRepoInput,
    GetPrincipalRepoInput, GetRoleByNameRepoInput, GetRoleRepoInput, ListDirectGrantsRepoInput,
    ListRoleExclusionsRepoInput, ListRoleMembershipsRepoInput, LoadAccessFactsRepoInput,
    PrincipalRecord, PrincipalRepository, RegisterCapabilityRepoInput, ResourceGraph,
    ResourceKind, ResourceNode, ResourceRef, Role, RoleExclusion, RoleExclusionRepoInput,
    RoleExclusionRepository, RoleGrantFact, RoleMembership, RoleMembershipRepository,
    RoleRepository, SetDirectGrantRepoInput, SetRoleMembershipRepoInput, TenantScope,
    UpdateRoleCapabilitiesRepoInput,
};

type GrantKey = (String, String, String);

#[derive(Default)]
struct State {
    principals: BTreeMap<String, PrincipalRecord>,
    businesses: BTreeMap<String, Business>,
    capabilities: BTreeMap<String, Capability>,
    roles: BTreeMap<String, Role>,
    /// (role_id, capability)
    exclusions: BTreeSet<(String, String)>,
    direct_grants: Vec<DirectGrant>,
    /// (principal, business, capability) -> index into `direct_grants`
    grant_index: HashMap<GrantKey, usize>,
    memberships: Vec<RoleMembership>,
    /// (principal, role, business) -> index into `memberships`
    membership_index: HashMap<GrantKey, usize>,
    nodes: HashMap<ResourceRef, ResourceNode>,
}

impl State {
    fn require_principal(&self, principal_id: &str) -> DomainResult<()> {
        if self.principals.contains_key(principal_id) {
            Ok(())
        } else {
            Err(DomainError::PrincipalNotFound(principal_id.to_string()))
        }
    }

    fn require_business(&self, business_id: &str) -> DomainResult<()> {
        if self.businesses.contains_key(business_id) {
            Ok(())
        } else {
            Err(DomainError::BusinessNotFound(business_id.to_string()))
        }
    }

    fn require_capabilities<'a>(
        &self,
        capabilities: impl IntoIterator<Item = &'a String>,
    ) -> DomainResult<()> {
        match capabilities
            .into_iter()
            .find(|capability| !self.capabilities.contains_key(*capability))
        {
            Some(unknown) => Err(DomainError::InvalidCapability(unknown.clone())),
            None => Ok(()),
        }
    }

    fn role_mut(&mut self, role_id: &str) -> DomainResult<&mut Role> {
        self.roles
            .get_mut(role_id)
            .ok_or_else(|| DomainError::RoleNotFound(role_id.to_string()))
    }

    fn exclusions_of(&self, role_id: &str) -> BTreeSet<String> {
        self.exclusions
            .iter()
            .filter(|(excluded_role, _)| excluded_role == role_id)
            .map(|(_, capability)| capability.clone())
            .collect()
    }

    fn is_excluded(&self, role_id: &str, capability: &str) -> bool {
        self.exclusions
            .contains(&(role_id.to_string(), capability.to_string()))
    }

    fn check_grant(&self, input: &SetDirectGrantRepoInput) -> DomainResult<()> {
        self.require_principal(&input.principal_id)?;
        self.require_business(&input.business_id)?;
        self.require_capabilities([&input.capability])
    }

    /// Upsert on the (principal, business, capability) triple; `check_grant` must pass first
    fn apply_grant(&mut self, input: SetDirectGrantRepoInput, now: DateTime<Utc>) -> DirectGrant {
        let key = (
            input.principal_id.clone(),
            input.business_id.clone(),
            input.capability.clone(),
        );

        if let Some(&index) = self.grant_index.get(&key) {
            let grant = &mut self.direct_grants[index];
            grant.active = input.active;
            grant.updated_at = Some(now);
            debug!(grant_id = %grant.id, "updated direct grant");
            return grant.clone();
        }

        let grant = DirectGrant {
            id: input.id,
            principal_id: input.principal_id,
            business_id: input.business_id,
            capability: input.capability,
            active: input.active,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.grant_index.insert(key, self.direct_grants.len());
        self.direct_grants.push(grant.clone());
        debug!(grant_id = %grant.id, "created direct grant");
        grant
    }

    fn check_membership(&self, input: &SetRoleMembershipRepoInput) -> DomainResult<()> {
        self.require_principal(&input.principal_id)?;
        if !self.roles.contains_key(&input.role_id) {
            return Err(DomainError::RoleNotFound(input.role_id.clone()));
        }
        self.require_business(&input.business_id)
    }

    fn apply_membership(
        &mut self,
        input: SetRoleMembershipRepoInput,
        now: DateTime<Utc>,
    ) -> RoleMembership {
        let key = (
            input.principal_id.clone(),
            input.role_id.clone(),
            input.business_id.clone(),
        );

        if let Some(&index) = self.membership_index.get(&key) {
            let membership = &mut self.memberships[index];
            membership.active = input.active;
            membership.updated_at = Some(now);
            debug!(membership_id = %membership.id, "updated role membership");
            return membership.clone();
        }

        let membership = RoleMembership {
            id: input.id,
            principal_id: input.principal_id,
            role_id: input.role_id,
            business_id: input.business_id,
            active: input.active,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.membership_index.insert(key, self.memberships.len());
        self.memberships.push(membership.clone());
        debug!(membership_id = %membership.id, "created role membership");
        membership
    }

    fn node(&self, reference: &ResourceRef) -> Option<ResourceNode> {
        if reference.kind == ResourceKind::Business {
            return self
                .businesses
                .get(&reference.id)
                .map(|business| ResourceNode::new(ResourceKind::Business, business.id.clone()));
        }
        self.nodes.get(reference).cloned()
    }
}

/// Point-in-time copy of the resource graph, resolved without holding the store lock
struct GraphSnapshot {
    nodes: HashMap<ResourceRef, ResourceNode>,
}

#[async_trait]
impl ResourceGraph for GraphSnapshot {
    async fn get_node(&self, resource: &ResourceRef) -> DomainResult<Option<ResourceNode>> {
        Ok(self.nodes.get(resource).cloned())
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        _scope: &TenantScope,
    ) -> DomainResult<Vec<ResourceRef>> {
        Ok(self
            .nodes
            .keys()
            .filter(|reference| reference.kind == kind)
            .cloned()
            .collect())
    }
}

/// In-process store implementing every access repository and the resource graph.
///
/// All state sits behind one `RwLock`: a read guard is a consistent snapshot
/// and guarded role mutations check exclusions under the same write guard
/// that applies them.
#[derive(Default)]
pub struct InMemoryAccessStore {
    state: RwLock<State>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a non-business resource instance with its relations.
    ///
    /// Business nodes are derived from `create_business` and are rejected here.
    pub async fn insert_node(&self, node: ResourceNode) -> DomainResult<()> {
        if node.kind() == ResourceKind::Business {
            return Err(DomainError::ValidationError(format!(
                "business {} must be created through the business repository",
                node.reference.id
            )));
        }
        let mut state = self.state.write().await;
        state.nodes.insert(node.reference.clone(), node);
        Ok(())
    }

    /// Forget a resource instance; relations pointing at it become dangling
    pub async fn remove_node(&self, reference: &ResourceRef) -> bool {
        let mut state = self.state.write().await;
        state.nodes.remove(reference).is_some()
    }
}

#[async_trait]
impl PrincipalRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(principal_id = %input.id))]
    async fn create_principal(
        &self,
        input: CreatePrincipalRepoInput,
    ) -> DomainResult<PrincipalRecord> {
        let mut state = self.state.write().await;
        let duplicate = state.principals.contains_key(&input.id)
            || state.principals.values().any(|p| p.email == input.email);
        if duplicate {
            return Err(DomainError::PrincipalAlreadyExists(input.id));
        }

        let record = PrincipalRecord {
            id: input.id,
            email: input.email,
            active: input.active,
            superuser: input.superuser,
            created_at: Some(Utc::now()),
        };
        state.principals.insert(record.id.clone(), record.clone());
        debug!("created principal");
        Ok(record)
    }

    async fn get_principal(
        &self,
        input: GetPrincipalRepoInput,
    ) -> DomainResult<Option<PrincipalRecord>> {
        let state = self.state.read().await;
        Ok(state.principals.get(&input.principal_id).cloned())
    }
}

#[async_trait]
impl BusinessRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(business_id = %input.id, name = %input.name))]
    async fn create_business(&self, input: CreateBusinessRepoInput) -> DomainResult<Business> {
        let mut state = self.state.write().await;
        let duplicate = state.businesses.contains_key(&input.id)
            || state.businesses.values().any(|b| {
                b.name == input.name || b.tin == input.tin || b.utr == input.utr
            });
        if duplicate {
            return Err(DomainError::BusinessAlreadyExists(input.id));
        }

        let now = Utc::now();
        let business = Business {
            id: input.id,
            name: input.name,
            tin: input.tin,
            utr: input.utr,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state
            .businesses
            .insert(business.id.clone(), business.clone());
        debug!("created business");
        Ok(business)
    }

    async fn get_business(&self, input: GetBusinessRepoInput) -> DomainResult<Option<Business>> {
        let state = self.state.read().await;
        Ok(state.businesses.get(&input.business_id).cloned())
    }

    async fn list_businesses(&self) -> DomainResult<Vec<Business>> {
        let state = self.state.read().await;
        let mut businesses: Vec<Business> = state.businesses.values().cloned().collect();
        businesses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(businesses)
    }
}

#[async_trait]
impl CapabilityRepository for InMemoryAccessStore {
    async fn register_capability(
        &self,
        input: RegisterCapabilityRepoInput,
    ) -> DomainResult<Capability> {
        let mut state = self.state.write().await;
        let capability = state
            .capabilities
            .entry(input.codename.clone())
            .or_insert_with(|| Capability {
                codename: input.codename,
                name: input.name,
            });
        Ok(capability.clone())
    }

    async fn get_capability(&self, codename: &str) -> DomainResult<Option<Capability>> {
        let state = self.state.read().await;
        Ok(state.capabilities.get(codename).cloned())
    }

    async fn list_capabilities(&self) -> DomainResult<Vec<Capability>> {
        let state = self.state.read().await;
        Ok(state.capabilities.values().cloned().collect())
    }
}

#[async_trait]
impl RoleRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(role_id = %input.id, name = %input.name))]
    async fn create_role(&self, input: CreateRoleRepoInput) -> DomainResult<Role> {
        let mut state = self.state.write().await;
        let duplicate = state.roles.contains_key(&input.id)
            || state.roles.values().any(|r| r.name == input.name);
        if duplicate {
            return Err(DomainError::RoleAlreadyExists(input.name));
        }

        let role = Role {
            id: input.id,
            name: input.name,
            capabilities: BTreeSet::new(),
        };
        state.roles.insert(role.id.clone(), role.clone());
        debug!("created role");
        Ok(role)
    }

    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&input.role_id).cloned())
    }

    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == input.name).cloned())
    }

    async fn list_roles(&self) -> DomainResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn add_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        let mut state = self.state.write().await;
        state.role_mut(&input.role_id)?;
        state.require_capabilities(&input.capabilities)?;
        enforce_exclusions(
            &input.role_id,
            &input.capabilities,
            &state.exclusions_of(&input.role_id),
        )?;

        let role = state.role_mut(&input.role_id)?;
        role.capabilities.extend(input.capabilities);
        debug!(count = role.capabilities.len(), "added role capabilities");
        Ok(role.clone())
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn remove_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        let mut state = self.state.write().await;
        let role = state.role_mut(&input.role_id)?;
        for capability in &input.capabilities {
            role.capabilities.remove(capability);
        }
        debug!(count = role.capabilities.len(), "removed role capabilities");
        Ok(role.clone())
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn set_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        let mut state = self.state.write().await;
        state.role_mut(&input.role_id)?;
        state.require_capabilities(&input.capabilities)?;
        enforce_exclusions(
            &input.role_id,
            &input.capabilities,
            &state.exclusions_of(&input.role_id),
        )?;

        let role = state.role_mut(&input.role_id)?;
        role.capabilities = input.capabilities.into_iter().collect();
        debug!(count = role.capabilities.len(), "replaced role capabilities");
        Ok(role.clone())
    }
}

#[async_trait]
impl RoleExclusionRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(role_id = %input.role_id, capability = %input.capability))]
    async fn add_role_exclusion(
        &self,
        input: RoleExclusionRepoInput,
    ) -> DomainResult<RoleExclusion> {
        let mut state = self.state.write().await;
        state.role_mut(&input.role_id)?;
        state.require_capabilities([&input.capability])?;

        state
            .exclusions
            .insert((input.role_id.clone(), input.capability.clone()));
        debug!("added role exclusion");
        Ok(RoleExclusion {
            role_id: input.role_id,
            capability: input.capability,
        })
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id, capability = %input.capability))]
    async fn remove_role_exclusion(&self, input: RoleExclusionRepoInput) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.exclusions.remove(&(input.role_id, input.capability)))
    }

    async fn list_role_exclusions(
        &self,
        input: ListRoleExclusionsRepoInput,
    ) -> DomainResult<Vec<RoleExclusion>> {
        let state = self.state.read().await;
        Ok(state
            .exclusions_of(&input.role_id)
            .into_iter()
            .map(|capability| RoleExclusion {
                role_id: input.role_id.clone(),
                capability,
            })
            .collect())
    }
}

#[async_trait]
impl DirectGrantRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(principal_id = %input.principal_id, business_id = %input.business_id, capability = %input.capability, active = input.active))]
    async fn set_direct_grant(&self, input: SetDirectGrantRepoInput) -> DomainResult<DirectGrant> {
        let mut state = self.state.write().await;
        state.check_grant(&input)?;
        Ok(state.apply_grant(input, Utc::now()))
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    async fn set_direct_grants(
        &self,
        inputs: Vec<SetDirectGrantRepoInput>,
    ) -> DomainResult<Vec<DirectGrant>> {
        let mut state = self.state.write().await;
        for input in &inputs {
            state.check_grant(input)?;
        }

        let now = Utc::now();
        Ok(inputs
            .into_iter()
            .map(|input| state.apply_grant(input, now))
            .collect())
    }

    async fn list_direct_grants(
        &self,
        input: ListDirectGrantsRepoInput,
    ) -> DomainResult<Vec<DirectGrant>> {
        let state = self.state.read().await;
        let mut grants: Vec<DirectGrant> = state
            .direct_grants
            .iter()
            .filter(|grant| grant.principal_id == input.principal_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| {
            (&a.business_id, &a.capability).cmp(&(&b.business_id, &b.capability))
        });
        Ok(grants)
    }
}

#[async_trait]
impl RoleMembershipRepository for InMemoryAccessStore {
    #[instrument(skip(self, input), fields(principal_id = %input.principal_id, role_id = %input.role_id, business_id = %input.business_id, active = input.active))]
    async fn set_role_membership(
        &self,
        input: SetRoleMembershipRepoInput,
    ) -> DomainResult<RoleMembership> {
        let mut state = self.state.write().await;
        state.check_membership(&input)?;
        Ok(state.apply_membership(input, Utc::now()))
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    async fn set_role_memberships(
        &self,
        inputs: Vec<SetRoleMembershipRepoInput>,
    ) -> DomainResult<Vec<RoleMembership>> {
        let mut state = self.state.write().await;
        for input in &inputs {
            state.check_membership(input)?;
        }

        let now = Utc::now();
        Ok(inputs
            .into_iter()
            .map(|input| state.apply_membership(input, now))
            .collect())
    }

    async fn list_role_memberships(
        &self,
        input: ListRoleMembershipsRepoInput,
    ) -> DomainResult<Vec<RoleMembership>> {
        let state = self.state.read().await;
        let mut memberships: Vec<RoleMembership> = state
            .memberships
            .iter()
            .filter(|membership| membership.principal_id == input.principal_id)
            .cloned()
            .collect();
        memberships
            .sort_by(|a, b| (&a.business_id, &a.role_id).cmp(&(&b.business_id, &b.role_id)));
        Ok(memberships)
    }
}

#[async_trait]
impl AccessFactRepository for InMemoryAccessStore {
    async fn load_access_facts(&self, input: LoadAccessFactsRepoInput) -> DomainResult<AccessFacts> {
        let state = self.state.read().await;
        let in_scope = |business_id: &str| {
            input
                .business_id
                .as_deref()
                .map_or(true, |wanted| wanted == business_id)
        };

        let direct_grants = state
            .direct_grants
            .iter()
            .filter(|grant| {
                grant.active
                    && grant.principal_id == input.principal_id
                    && grant.capability == input.capability
                    && in_scope(&grant.business_id)
            })
            .map(|grant| grant.business_id.clone())
            .collect();

        let role_grants = state
            .memberships
            .iter()
            .filter(|membership| {
                membership.active
                    && membership.principal_id == input.principal_id
                    && in_scope(&membership.business_id)
            })
            .filter_map(|membership| {
                let role = state.roles.get(&membership.role_id)?;
                Some(RoleGrantFact {
                    business_id: membership.business_id.clone(),
                    role_id: role.id.clone(),
                    role_has_capability: role.capabilities.contains(&input.capability),
                    excluded: state.is_excluded(&role.id, &input.capability),
                })
            })
            .collect();

        Ok(AccessFacts {
            capability_exists: state.capabilities.contains_key(&input.capability),
            direct_grants,
            role_grants,
        })
    }

    async fn list_tenant_ids(&self) -> DomainResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.businesses.keys().cloned().collect())
    }
}

#[async_trait]
impl ResourceGraph for InMemoryAccessStore {
    async fn get_node(&self, resource: &ResourceRef) -> DomainResult<Option<ResourceNode>> {
        let state = self.state.read().await;
        Ok(state.node(resource))
    }

    #[instrument(skip(self, scope), fields(kind = kind.as_str()))]
    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &TenantScope,
    ) -> DomainResult<Vec<ResourceRef>> {
        let snapshot = {
            let state = self.state.read().await;
            let mut nodes = state.nodes.clone();
            nodes.extend(state.businesses.keys().map(|id| {
                let node = ResourceNode::new(ResourceKind::Business, id.clone());
                (node.reference.clone(), node)
            }));
            GraphSnapshot { nodes }
        };

        let mut candidates: Vec<&ResourceNode> = snapshot
            .nodes
            .values()
            .filter(|node| node.kind() == kind)
            .collect();
        candidates.sort_by(|a, b| a.reference.cmp(&b.reference));

        if matches!(scope, TenantScope::All) {
            return Ok(candidates.into_iter().map(|n| n.reference.clone()).collect());
        }

        let mut resources = Vec::new();
        for node in candidates {
            let owner = resolve_owner(&snapshot, node).await?;
            if owner.is_some_and(|business_id| scope.contains(&business_id)) {
                resources.push(node.reference.clone());
            }
        }
        debug!(count = resources.len(), "listed resources in scope");
        Ok(resources)
    }
}
