use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::auth::{action_for, capability_for, resolve_owner, Action, AuthorizationProvider};
use crate::domain::{
    AccessFactRepository, AccessFacts, DomainError, DomainResult, LoadAccessFactsRepoInput,
    Principal, ResourceGraph, ResourceKind, ResourceNode, ResourceRef, RoleGrantFact, TenantScope,
};

/// Authorization engine over direct grants, role memberships and role exclusions.
///
/// Every decision loads its facts through one `load_access_facts` call, which
/// stores serve from a single snapshot. Nothing is cached.
#[derive(Clone)]
pub struct BusinessAuthorizationService {
    facts: Arc<dyn AccessFactRepository>,
    graph: Arc<dyn ResourceGraph>,
}

impl BusinessAuthorizationService {
    pub fn new(facts: Arc<dyn AccessFactRepository>, graph: Arc<dyn ResourceGraph>) -> Self {
        Self { facts, graph }
    }

    async fn load_facts(
        &self,
        principal: &Principal,
        capability: &str,
        business_id: Option<&str>,
    ) -> DomainResult<AccessFacts> {
        self.facts
            .load_access_facts(LoadAccessFactsRepoInput {
                principal_id: principal.id.clone(),
                capability: capability.to_string(),
                business_id: business_id.map(str::to_string),
            })
            .await
    }

    /// Grant check for a non-superuser, active principal in one business
    async fn granted_in_tenant(
        &self,
        principal: &Principal,
        capability: &str,
        business_id: &str,
    ) -> DomainResult<bool> {
        let facts = self.load_facts(principal, capability, Some(business_id)).await?;

        if !facts.capability_exists {
            debug!(error = %DomainError::InvalidCapability(capability.to_string()), "denied");
            return Ok(false);
        }

        if facts.direct_grants.iter().any(|id| id == business_id) {
            debug!("allowed by direct grant");
            return Ok(true);
        }

        if let Some(fact) = facts
            .role_grants
            .iter()
            .find(|fact| fact.business_id == business_id && role_confers(fact))
        {
            debug!(role_id = %fact.role_id, "allowed by role membership");
            return Ok(true);
        }

        debug!("denied, no active grant confers the capability");
        Ok(false)
    }

    async fn tenants_for(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<TenantScope> {
        if !principal.active {
            return Ok(TenantScope::Only(BTreeSet::new()));
        }
        if principal.superuser {
            return Ok(TenantScope::All);
        }

        let capability = capability_for(kind, action);
        let facts = self.load_facts(principal, &capability, None).await?;
        Ok(TenantScope::Only(tenants_from_facts(&facts)))
    }
}

/// A membership confers a capability only if the role grants it and does not exclude it
fn role_confers(fact: &RoleGrantFact) -> bool {
    fact.role_has_capability && !fact.excluded
}

/// Union of directly granted and role-derived businesses, deduplicated
fn tenants_from_facts(facts: &AccessFacts) -> BTreeSet<String> {
    if !facts.capability_exists {
        return BTreeSet::new();
    }

    let via_role = facts
        .role_grants
        .iter()
        .filter(|fact| role_confers(fact))
        .map(|fact| fact.business_id.clone());

    facts.direct_grants.iter().cloned().chain(via_role).collect()
}

#[async_trait]
impl AuthorizationProvider for BusinessAuthorizationService {
    #[instrument(skip(self, principal, resource), fields(principal_id = %principal.id, action = action.as_str(), resource = %resource.reference))]
    async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &ResourceNode,
    ) -> DomainResult<bool> {
        if !principal.active {
            debug!("denied, principal is inactive");
            return Ok(false);
        }
        if principal.superuser {
            return Ok(true);
        }

        let Some(business_id) = resolve_owner(self.graph.as_ref(), resource).await? else {
            debug!(error = %DomainError::UnresolvedTenant(resource.reference.to_string()), "denied");
            return Ok(false);
        };

        let capability = capability_for(resource.kind(), action);
        self.granted_in_tenant(principal, &capability, &business_id)
            .await
    }

    #[instrument(skip(self, principal, resource), fields(principal_id = %principal.id, resource = %resource.reference))]
    async fn authorize_method(
        &self,
        principal: &Principal,
        method: &str,
        resource: &ResourceNode,
    ) -> DomainResult<bool> {
        match action_for(method) {
            Ok(action) => self.authorize(principal, action, resource).await,
            Err(err @ DomainError::UnknownMethod(_)) => {
                debug!(error = %err, "denied");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    async fn authorize_in_tenant(
        &self,
        principal: &Principal,
        capability: &str,
        business_id: &str,
    ) -> DomainResult<bool> {
        if !principal.active {
            debug!("denied, principal is inactive");
            return Ok(false);
        }
        if principal.superuser {
            return Ok(true);
        }
        self.granted_in_tenant(principal, capability, business_id)
            .await
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id, action = action.as_str(), kind = kind.as_str()))]
    async fn authorizable(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<bool> {
        let scope = self.tenants_for(principal, action, kind).await?;
        Ok(!scope.is_empty())
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id, action = action.as_str(), kind = kind.as_str()))]
    async fn accessible_tenants(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<BTreeSet<String>> {
        let tenants = match self.tenants_for(principal, action, kind).await? {
            TenantScope::All => self.facts.list_tenant_ids().await?.into_iter().collect(),
            TenantScope::Only(ids) => ids,
        };

        debug!(count = tenants.len(), "accessible businesses");
        Ok(tenants)
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id, action = action.as_str(), kind = kind.as_str()))]
    async fn accessible_resources(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> DomainResult<Vec<ResourceRef>> {
        let scope = self.tenants_for(principal, action, kind).await?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let resources = self.graph.list_resources(kind, &scope).await?;
        debug!(count = resources.len(), "accessible resources");
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Asset, BusinessRepository, CapabilityRepository, CreateBusinessRepoInput,
        CreatePrincipalRepoInput, CreateRoleRepoInput, DirectGrantRepository, Headquarters,
        InternalLocation, MockAccessFactRepository, MockResourceGraph, PrincipalRepository,
        RegisterCapabilityRepoInput, Resource, RoleExclusionRepoInput, RoleExclusionRepository,
        RoleMembershipRepository, RoleRepository, SetDirectGrantRepoInput,
        SetRoleMembershipRepoInput, UpdateRoleCapabilitiesRepoInput,
    };
    use crate::memory::InMemoryAccessStore;

    const PRINCIPAL_ID: &str = "user-1";
    const T1: &str = "biz-1";
    const T2: &str = "biz-2";

    struct Fixture {
        store: Arc<InMemoryAccessStore>,
        service: BusinessAuthorizationService,
        principal: Principal,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAccessStore::new());

        store
            .create_principal(CreatePrincipalRepoInput {
                id: PRINCIPAL_ID.to_string(),
                email: "user@example.com".to_string(),
                active: true,
                superuser: false,
            })
            .await
            .unwrap();

        for (id, name) in [(T1, "Acme"), (T2, "Globex")] {
            store
                .create_business(CreateBusinessRepoInput {
                    id: id.to_string(),
                    name: name.to_string(),
                    tin: format!("tin-{id}"),
                    utr: format!("utr-{id}"),
                })
                .await
                .unwrap();
        }

        for capability in crate::auth::default_capabilities() {
            store
                .register_capability(RegisterCapabilityRepoInput {
                    codename: capability.codename,
                    name: capability.name,
                })
                .await
                .unwrap();
        }

        // biz-1: hq-1 / loc-1 / asset-1, biz-2: hq-2 / loc-2 / asset-2
        for (business_id, suffix) in [(T1, "1"), (T2, "2")] {
            let headquarters = Headquarters {
                id: format!("hq-{suffix}"),
                business_id: business_id.to_string(),
                name: format!("HQ {suffix}"),
                address: "Main street".to_string(),
                phone: "555".to_string(),
            };
            let location = InternalLocation {
                id: format!("loc-{suffix}"),
                headquarters_id: headquarters.id.clone(),
                name: format!("Room {suffix}"),
                floor: "1".to_string(),
                room_number: suffix.to_string(),
            };
            let asset = Asset {
                id: format!("asset-{suffix}"),
                name: format!("Pump {suffix}"),
                internal_location_id: Some(location.id.clone()),
                system_segregation_id: None,
            };
            store.insert_node(headquarters.node()).await.unwrap();
            store.insert_node(location.node()).await.unwrap();
            store.insert_node(asset.node()).await.unwrap();
        }

        let service = BusinessAuthorizationService::new(store.clone(), store.clone());
        Fixture {
            store,
            service,
            principal: Principal::new(PRINCIPAL_ID),
        }
    }

    async fn grant(store: &InMemoryAccessStore, business_id: &str, capability: &str, active: bool) {
        store
            .set_direct_grant(SetDirectGrantRepoInput {
                id: xid::new().to_string(),
                principal_id: PRINCIPAL_ID.to_string(),
                business_id: business_id.to_string(),
                capability: capability.to_string(),
                active,
            })
            .await
            .unwrap();
    }

    async fn role_with(store: &InMemoryAccessStore, name: &str, capabilities: &[&str]) -> String {
        let role = store
            .create_role(CreateRoleRepoInput {
                id: format!("role-{}", name.to_lowercase()),
                name: name.to_string(),
            })
            .await
            .unwrap();
        store
            .add_role_capabilities(UpdateRoleCapabilitiesRepoInput {
                role_id: role.id.clone(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            })
            .await
            .unwrap();
        role.id
    }

    async fn join(store: &InMemoryAccessStore, role_id: &str, business_id: &str, active: bool) {
        store
            .set_role_membership(SetRoleMembershipRepoInput {
                id: xid::new().to_string(),
                principal_id: PRINCIPAL_ID.to_string(),
                role_id: role_id.to_string(),
                business_id: business_id.to_string(),
                active,
            })
            .await
            .unwrap();
    }

    fn asset(suffix: &str) -> ResourceNode {
        ResourceNode::new(ResourceKind::Asset, format!("asset-{suffix}"))
            .with_relation(ResourceKind::InternalLocation, format!("loc-{suffix}"))
    }

    #[tokio::test]
    async fn test_superuser_bypasses_every_check() {
        let f = fixture().await;
        let superuser = Principal::superuser("root");
        let orphan = ResourceNode::new(ResourceKind::Asset, "asset-orphan");

        for action in Action::ALL {
            assert!(f.service.authorize(&superuser, action, &asset("1")).await.unwrap());
            assert!(f.service.authorize(&superuser, action, &orphan).await.unwrap());
        }
        assert!(f
            .service
            .authorize_in_tenant(&superuser, "not_a_capability", T2)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_inactive_principal_is_denied_even_as_superuser() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;

        let inactive = f.principal.clone().inactive();
        assert!(!f.service.authorize(&inactive, Action::View, &asset("1")).await.unwrap());

        let inactive_root = Principal::superuser("root").inactive();
        assert!(!f
            .service
            .authorize(&inactive_root, Action::View, &asset("1"))
            .await
            .unwrap());
        assert!(f
            .service
            .accessible_tenants(&inactive, Action::View, ResourceKind::Asset)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_direct_grant_is_isolated_to_its_business() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;

        assert!(f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
        assert!(!f.service.authorize(&f.principal, Action::View, &asset("2")).await.unwrap());
        assert!(!f.service.authorize(&f.principal, Action::Delete, &asset("1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exclusion_overrides_role_capability() {
        let f = fixture().await;
        let admin = role_with(&f.store, "ADMIN", &["delete_asset", "view_asset"]).await;
        join(&f.store, &admin, T1, true).await;

        assert!(f.service.authorize(&f.principal, Action::Delete, &asset("1")).await.unwrap());

        f.store
            .add_role_exclusion(RoleExclusionRepoInput {
                role_id: admin.clone(),
                capability: "delete_asset".to_string(),
            })
            .await
            .unwrap();

        assert!(!f.service.authorize(&f.principal, Action::Delete, &asset("1")).await.unwrap());
        assert!(f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exclusion_does_not_touch_direct_grants() {
        let f = fixture().await;
        let admin = role_with(&f.store, "ADMIN", &["delete_asset"]).await;
        join(&f.store, &admin, T1, true).await;
        f.store
            .add_role_exclusion(RoleExclusionRepoInput {
                role_id: admin,
                capability: "delete_asset".to_string(),
            })
            .await
            .unwrap();
        grant(&f.store, T1, "delete_asset", true).await;

        assert!(f.service.authorize(&f.principal, Action::Delete, &asset("1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_grant_is_inert() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", false).await;

        assert!(!f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
        assert!(!f
            .service
            .authorizable(&f.principal, Action::View, ResourceKind::Asset)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_inactive_membership_is_inert() {
        let f = fixture().await;
        let manager = role_with(&f.store, "MANAGER", &["view_asset"]).await;
        join(&f.store, &manager, T1, false).await;

        assert!(!f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_membership_is_scoped_to_its_business() {
        let f = fixture().await;
        let manager = role_with(&f.store, "MANAGER", &["view_asset"]).await;
        join(&f.store, &manager, T2, true).await;

        assert!(!f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
        assert!(f.service.authorize(&f.principal, Action::View, &asset("2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_multi_hop_ownership_authorizes_internal_location() {
        let f = fixture().await;
        grant(&f.store, T1, "view_internallocation", true).await;

        let location = ResourceNode::new(ResourceKind::InternalLocation, "loc-1")
            .with_relation(ResourceKind::Headquarters, "hq-1");
        assert!(f.service.authorize(&f.principal, Action::View, &location).await.unwrap());

        let other = ResourceNode::new(ResourceKind::InternalLocation, "loc-2")
            .with_relation(ResourceKind::Headquarters, "hq-2");
        assert!(!f.service.authorize(&f.principal, Action::View, &other).await.unwrap());
    }

    #[tokio::test]
    async fn test_unresolved_tenant_denies_without_loading_facts() {
        let mut facts = MockAccessFactRepository::new();
        facts.expect_load_access_facts().times(0);
        let mut graph = MockResourceGraph::new();
        graph.expect_get_node().returning(|_| Ok(None));

        let service = BusinessAuthorizationService::new(Arc::new(facts), Arc::new(graph));
        let orphan = ResourceNode::new(ResourceKind::Asset, "asset-x")
            .with_relation(ResourceKind::InternalLocation, "loc-gone");

        let allowed = service
            .authorize(&Principal::new(PRINCIPAL_ID), Action::View, &orphan)
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn test_unknown_method_is_denied_not_raised() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;

        assert!(f
            .service
            .authorize_method(&f.principal, "GET", &asset("1"))
            .await
            .unwrap());
        assert!(!f
            .service
            .authorize_method(&f.principal, "TRACE", &asset("1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_capability_missing_from_catalog_is_denied() {
        let mut facts = MockAccessFactRepository::new();
        facts.expect_load_access_facts().returning(|input| {
            Ok(AccessFacts {
                capability_exists: false,
                direct_grants: vec![input.business_id.clone().unwrap_or_default()],
                role_grants: Vec::new(),
            })
        });
        let service =
            BusinessAuthorizationService::new(Arc::new(facts), Arc::new(MockResourceGraph::new()));

        let allowed = service
            .authorize_in_tenant(&Principal::new(PRINCIPAL_ID), "fly_asset", T1)
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut facts = MockAccessFactRepository::new();
        facts
            .expect_load_access_facts()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("connection lost"))));
        let service =
            BusinessAuthorizationService::new(Arc::new(facts), Arc::new(MockResourceGraph::new()));

        let result = service
            .authorize_in_tenant(&Principal::new(PRINCIPAL_ID), "view_asset", T1)
            .await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_accessible_tenants_union_is_deduplicated() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;
        let manager = role_with(&f.store, "MANAGER", &["view_asset"]).await;
        join(&f.store, &manager, T1, true).await;
        let viewer = role_with(&f.store, "VIEWER", &["view_asset"]).await;
        join(&f.store, &viewer, T1, true).await;

        let tenants = f
            .service
            .accessible_tenants(&f.principal, Action::View, ResourceKind::Asset)
            .await
            .unwrap();
        assert_eq!(tenants, BTreeSet::from([T1.to_string()]));
    }

    #[tokio::test]
    async fn test_accessible_tenants_skip_excluded_roles() {
        let f = fixture().await;
        let admin = role_with(&f.store, "ADMIN", &["change_asset"]).await;
        let manager = role_with(&f.store, "MANAGER", &["change_asset"]).await;
        join(&f.store, &admin, T1, true).await;
        join(&f.store, &manager, T2, true).await;
        f.store
            .add_role_exclusion(RoleExclusionRepoInput {
                role_id: admin,
                capability: "change_asset".to_string(),
            })
            .await
            .unwrap();

        let tenants = f
            .service
            .accessible_tenants(&f.principal, Action::Change, ResourceKind::Asset)
            .await
            .unwrap();
        assert_eq!(tenants, BTreeSet::from([T2.to_string()]));
    }

    #[tokio::test]
    async fn test_superuser_sees_every_tenant() {
        let f = fixture().await;
        let tenants = f
            .service
            .accessible_tenants(&Principal::superuser("root"), Action::View, ResourceKind::Asset)
            .await
            .unwrap();
        assert_eq!(tenants, BTreeSet::from([T1.to_string(), T2.to_string()]));
    }

    #[tokio::test]
    async fn test_authorizable_needs_some_tenant() {
        let f = fixture().await;
        assert!(!f
            .service
            .authorizable(&f.principal, Action::Add, ResourceKind::Headquarters)
            .await
            .unwrap());

        grant(&f.store, T2, "add_headquarters", true).await;
        assert!(f
            .service
            .authorizable(&f.principal, Action::Add, ResourceKind::Headquarters)
            .await
            .unwrap());
        assert!(!f
            .service
            .authorizable(&f.principal, Action::Delete, ResourceKind::Headquarters)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_accessible_resources_follow_accessible_tenants() {
        let f = fixture().await;
        grant(&f.store, T2, "view_asset", true).await;

        let assets = f
            .service
            .accessible_resources(&f.principal, Action::View, ResourceKind::Asset)
            .await
            .unwrap();
        assert_eq!(assets, vec![ResourceRef::new(ResourceKind::Asset, "asset-2")]);

        let none = f
            .service
            .accessible_resources(&f.principal, Action::Delete, ResourceKind::Asset)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_superuser_lists_unowned_resources_too() {
        let f = fixture().await;
        f.store
            .insert_node(ResourceNode::new(ResourceKind::Asset, "asset-orphan"))
            .await
            .unwrap();

        let assets = f
            .service
            .accessible_resources(&Principal::superuser("root"), Action::View, ResourceKind::Asset)
            .await
            .unwrap();
        assert_eq!(assets.len(), 3);
        assert!(assets.contains(&ResourceRef::new(ResourceKind::Asset, "asset-orphan")));
    }

    #[tokio::test]
    async fn test_repeated_activation_is_idempotent() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;
        let once = f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap();
        grant(&f.store, T1, "view_asset", true).await;
        let twice = f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap();

        assert_eq!(once, twice);
        let grants = f
            .store
            .list_direct_grants(crate::domain::ListDirectGrantsRepoInput {
                principal_id: PRINCIPAL_ID.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivating_grant_revokes_access() {
        let f = fixture().await;
        grant(&f.store, T1, "view_asset", true).await;
        assert!(f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());

        grant(&f.store, T1, "view_asset", false).await;
        assert!(!f.service.authorize(&f.principal, Action::View, &asset("1")).await.unwrap());
    }
}
