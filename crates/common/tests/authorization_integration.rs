#![cfg(feature = "integration-tests")]

use std::collections::BTreeSet;
use std::sync::Arc;

use common::auth::{default_capabilities, Action, AuthorizationProvider, BusinessAuthorizationService};
use common::domain::{
    BusinessRepository, CapabilityRepository, CreateBusinessRepoInput, CreatePrincipalRepoInput,
    CreateRoleRepoInput, DirectGrantRepository, DomainError, ListDirectGrantsRepoInput,
    Principal, PrincipalRepository, RegisterCapabilityRepoInput, ResourceKind, ResourceNode,
    ResourceRef, RoleExclusionRepoInput, RoleExclusionRepository, RoleMembershipRepository,
    RoleRepository, SetDirectGrantRepoInput, SetRoleMembershipRepoInput,
    UpdateRoleCapabilitiesRepoInput,
};
use common::postgres::{
    MigrationRunner, PostgresAccessFactRepository, PostgresBusinessRepository,
    PostgresCapabilityRepository, PostgresClient, PostgresConfig, PostgresDirectGrantRepository,
    PostgresPrincipalRepository, PostgresResourceGraph, PostgresRoleMembershipRepository,
    PostgresRoleRepository,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

const TEST_USER_ID: &str = "test-user-001";
const BIZ_A: &str = "biz-a";
const BIZ_B: &str = "biz-b";

struct TestDb {
    _container: ContainerAsync<Postgres>,
    client: PostgresClient,
    roles: PostgresRoleRepository,
    grants: PostgresDirectGrantRepository,
    memberships: PostgresRoleMembershipRepository,
    service: BusinessAuthorizationService,
}

async fn setup_test_db() -> TestDb {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let config = PostgresConfig {
        host: host.to_string(),
        port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        max_pool_size: 5,
        migrations_dir: format!(
            "{}/../../crates/init_process/migrations/postgres",
            env!("CARGO_MANIFEST_DIR")
        ),
        goose_binary_path: which::which("goose")
            .expect("goose binary not found")
            .to_string_lossy()
            .to_string(),
    };

    MigrationRunner::from_config(&config)
        .run_migrations()
        .await
        .expect("Migrations failed");

    let client = PostgresClient::new(&config).expect("Failed to create client");

    PostgresPrincipalRepository::new(client.clone())
        .create_principal(CreatePrincipalRepoInput {
            id: TEST_USER_ID.to_string(),
            email: "test@example.com".to_string(),
            active: true,
            superuser: false,
        })
        .await
        .unwrap();

    let businesses = PostgresBusinessRepository::new(client.clone());
    for (id, name) in [(BIZ_A, "Acme"), (BIZ_B, "Globex")] {
        businesses
            .create_business(CreateBusinessRepoInput {
                id: id.to_string(),
                name: name.to_string(),
                tin: format!("tin-{id}"),
                utr: format!("utr-{id}"),
            })
            .await
            .unwrap();
    }

    let catalog = PostgresCapabilityRepository::new(client.clone());
    for capability in default_capabilities() {
        catalog
            .register_capability(RegisterCapabilityRepoInput {
                codename: capability.codename,
                name: capability.name,
            })
            .await
            .unwrap();
    }

    // hq/loc/asset chain for each business
    let conn = client.get_connection().await.unwrap();
    conn.batch_execute(
        "INSERT INTO headquarters (id, business_id, name) VALUES
            ('hq-a', 'biz-a', 'HQ A'), ('hq-b', 'biz-b', 'HQ B');
         INSERT INTO internal_locations (id, headquarters_id, name) VALUES
            ('loc-a', 'hq-a', 'Room A'), ('loc-b', 'hq-b', 'Room B');
         INSERT INTO system_segregations (id, segregation_type) VALUES ('seg-1', 'Electrical');
         INSERT INTO assets (id, name, internal_location_id, system_segregation_id) VALUES
            ('asset-a', 'Pump A', 'loc-a', 'seg-1'),
            ('asset-b', 'Pump B', 'loc-b', NULL),
            ('asset-loose', 'Spare', NULL, 'seg-1');",
    )
    .await
    .unwrap();

    let service = BusinessAuthorizationService::new(
        Arc::new(PostgresAccessFactRepository::new(client.clone())),
        Arc::new(PostgresResourceGraph::new(client.clone())),
    );

    TestDb {
        _container: postgres,
        roles: PostgresRoleRepository::new(client.clone()),
        grants: PostgresDirectGrantRepository::new(client.clone()),
        memberships: PostgresRoleMembershipRepository::new(client.clone()),
        client,
        service,
    }
}

fn grant(business_id: &str, capability: &str, active: bool) -> SetDirectGrantRepoInput {
    SetDirectGrantRepoInput {
        id: xid::new().to_string(),
        principal_id: TEST_USER_ID.to_string(),
        business_id: business_id.to_string(),
        capability: capability.to_string(),
        active,
    }
}

fn asset(id: &str, location_id: &str) -> ResourceNode {
    ResourceNode::new(ResourceKind::Asset, id).with_relation(ResourceKind::InternalLocation, location_id)
}

async fn admin_role(db: &TestDb, capabilities: &[&str]) -> String {
    let role = db
        .roles
        .create_role(CreateRoleRepoInput {
            id: xid::new().to_string(),
            name: "ADMIN".to_string(),
        })
        .await
        .unwrap();
    db.roles
        .add_role_capabilities(UpdateRoleCapabilitiesRepoInput {
            role_id: role.id.clone(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        })
        .await
        .unwrap();
    role.id
}

#[tokio::test]
async fn test_direct_grant_is_scoped_to_business() {
    let db = setup_test_db().await;
    db.grants.set_direct_grant(grant(BIZ_A, "view_asset", true)).await.unwrap();

    let principal = Principal::new(TEST_USER_ID);
    assert!(db
        .service
        .authorize(&principal, Action::View, &asset("asset-a", "loc-a"))
        .await
        .unwrap());
    assert!(!db
        .service
        .authorize(&principal, Action::View, &asset("asset-b", "loc-b"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_exclusion_beats_role_capability() {
    let db = setup_test_db().await;
    let role_id = admin_role(&db, &["delete_asset"]).await;
    db.memberships
        .set_role_membership(SetRoleMembershipRepoInput {
            id: xid::new().to_string(),
            principal_id: TEST_USER_ID.to_string(),
            role_id: role_id.clone(),
            business_id: BIZ_A.to_string(),
            active: true,
        })
        .await
        .unwrap();

    let principal = Principal::new(TEST_USER_ID);
    let target = asset("asset-a", "loc-a");
    assert!(db.service.authorize(&principal, Action::Delete, &target).await.unwrap());

    db.roles
        .add_role_exclusion(RoleExclusionRepoInput {
            role_id,
            capability: "delete_asset".to_string(),
        })
        .await
        .unwrap();
    assert!(!db.service.authorize(&principal, Action::Delete, &target).await.unwrap());
}

#[tokio::test]
async fn test_guarded_add_rejects_excluded_capability_without_writing() {
    let db = setup_test_db().await;
    let role_id = admin_role(&db, &["view_asset"]).await;
    db.roles
        .add_role_exclusion(RoleExclusionRepoInput {
            role_id: role_id.clone(),
            capability: "delete_asset".to_string(),
        })
        .await
        .unwrap();

    let result = db
        .roles
        .add_role_capabilities(UpdateRoleCapabilitiesRepoInput {
            role_id: role_id.clone(),
            capabilities: vec!["change_asset".to_string(), "delete_asset".to_string()],
        })
        .await;
    assert!(matches!(
        result,
        Err(DomainError::ExclusionViolation { capabilities, .. }) if capabilities == vec!["delete_asset".to_string()]
    ));

    let role = db
        .roles
        .get_role(common::domain::GetRoleRepoInput { role_id })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.capabilities, BTreeSet::from(["view_asset".to_string()]));
}

#[tokio::test]
async fn test_set_role_capabilities_replaces_the_set() {
    let db = setup_test_db().await;
    let role_id = admin_role(&db, &["view_asset", "change_asset"]).await;

    let role = db
        .roles
        .set_role_capabilities(UpdateRoleCapabilitiesRepoInput {
            role_id,
            capabilities: vec!["add_asset".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(role.capabilities, BTreeSet::from(["add_asset".to_string()]));
}

#[tokio::test]
async fn test_grant_toggle_upserts_one_row() {
    let db = setup_test_db().await;
    let first = db.grants.set_direct_grant(grant(BIZ_A, "view_asset", true)).await.unwrap();
    let second = db.grants.set_direct_grant(grant(BIZ_A, "view_asset", false)).await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(!second.active);

    let listed = db
        .grants
        .list_direct_grants(ListDirectGrantsRepoInput {
            principal_id: TEST_USER_ID.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_foreign_key_failures_name_the_missing_entity() {
    let db = setup_test_db().await;

    let result = db.grants.set_direct_grant(grant("biz-gone", "view_asset", true)).await;
    assert!(matches!(result, Err(DomainError::BusinessNotFound(_))));

    let result = db.grants.set_direct_grant(grant(BIZ_A, "fly_asset", true)).await;
    assert!(matches!(result, Err(DomainError::InvalidCapability(_))));

    let result = db
        .memberships
        .set_role_membership(SetRoleMembershipRepoInput {
            id: xid::new().to_string(),
            principal_id: TEST_USER_ID.to_string(),
            role_id: "role-gone".to_string(),
            business_id: BIZ_A.to_string(),
            active: true,
        })
        .await;
    assert!(matches!(result, Err(DomainError::RoleNotFound(_))));
}

#[tokio::test]
async fn test_accessible_resources_are_scoped_in_sql() {
    let db = setup_test_db().await;
    db.grants.set_direct_grant(grant(BIZ_B, "view_asset", true)).await.unwrap();

    let principal = Principal::new(TEST_USER_ID);
    let resources = db
        .service
        .accessible_resources(&principal, Action::View, ResourceKind::Asset)
        .await
        .unwrap();
    assert_eq!(resources, vec![ResourceRef::new(ResourceKind::Asset, "asset-b")]);

    let all = db
        .service
        .accessible_resources(&Principal::superuser("root"), Action::View, ResourceKind::Asset)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_ownership_resolves_through_stored_rows() {
    let db = setup_test_db().await;
    db.grants
        .set_direct_grant(grant(BIZ_A, "view_internallocation", true))
        .await
        .unwrap();

    let location = ResourceNode::new(ResourceKind::InternalLocation, "loc-a")
        .with_relation(ResourceKind::Headquarters, "hq-a");
    let principal = Principal::new(TEST_USER_ID);
    assert!(db.service.authorize(&principal, Action::View, &location).await.unwrap());

    // an asset with only a global relation resolves to no business
    let loose = ResourceNode::new(ResourceKind::Asset, "asset-loose")
        .with_relation(ResourceKind::SystemSegregation, "seg-1");
    assert!(!db.service.authorize(&principal, Action::View, &loose).await.unwrap());

    db.client.ping().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exclusion_and_add_serialize() {
    let db = setup_test_db().await;
    let principal = Principal::new(TEST_USER_ID);
    let target = asset("asset-a", "loc-a");

    for i in 0..20 {
        let role = db
            .roles
            .create_role(CreateRoleRepoInput {
                id: xid::new().to_string(),
                name: format!("RACE-{i}"),
            })
            .await
            .unwrap();
        db.memberships
            .set_role_membership(SetRoleMembershipRepoInput {
                id: xid::new().to_string(),
                principal_id: TEST_USER_ID.to_string(),
                role_id: role.id.clone(),
                business_id: BIZ_A.to_string(),
                active: true,
            })
            .await
            .unwrap();

        let excluding = {
            let roles = db.roles.clone();
            let role_id = role.id.clone();
            tokio::spawn(async move {
                roles
                    .add_role_exclusion(RoleExclusionRepoInput {
                        role_id,
                        capability: "delete_asset".to_string(),
                    })
                    .await
            })
        };
        let adding = {
            let roles = db.roles.clone();
            let role_id = role.id.clone();
            tokio::spawn(async move {
                roles
                    .add_role_capabilities(UpdateRoleCapabilitiesRepoInput {
                        role_id,
                        capabilities: vec!["delete_asset".to_string()],
                    })
                    .await
            })
        };
        let (excluded, added) = tokio::join!(excluding, adding);
        excluded.unwrap().unwrap();

        let stored = db
            .roles
            .get_role(common::domain::GetRoleRepoInput {
                role_id: role.id.clone(),
            })
            .await
            .unwrap()
            .unwrap();
        match added.unwrap() {
            // Add committed first; the exclusion followed and now wins on reads
            Ok(_) => assert!(stored.capabilities.contains("delete_asset")),
            Err(DomainError::ExclusionViolation { .. }) => {
                assert!(!stored.capabilities.contains("delete_asset"))
            }
            Err(other) => panic!("role {} writes did not serialize: {other:?}", role.id),
        }

        assert!(!db.service.authorize(&principal, Action::Delete, &target).await.unwrap());
    }
}

#[tokio::test]
async fn test_failed_bulk_grants_roll_back() {
    let db = setup_test_db().await;

    let result = db
        .grants
        .set_direct_grants(vec![
            grant(BIZ_A, "view_asset", true),
            grant(BIZ_B, "view_spaceship", true),
        ])
        .await;
    assert!(matches!(result, Err(DomainError::InvalidCapability(c)) if c == "view_spaceship"));

    let listed = db
        .grants
        .list_direct_grants(ListDirectGrantsRepoInput {
            principal_id: TEST_USER_ID.to_string(),
        })
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_failed_bulk_memberships_roll_back() {
    let db = setup_test_db().await;
    let role_id = admin_role(&db, &["view_asset"]).await;
    let membership = |business_id: &str| SetRoleMembershipRepoInput {
        id: xid::new().to_string(),
        principal_id: TEST_USER_ID.to_string(),
        role_id: role_id.clone(),
        business_id: business_id.to_string(),
        active: true,
    };

    let result = db
        .memberships
        .set_role_memberships(vec![membership(BIZ_A), membership("biz-gone")])
        .await;
    assert!(matches!(result, Err(DomainError::BusinessNotFound(b)) if b == "biz-gone"));

    let listed = db
        .memberships
        .list_role_memberships(common::domain::ListRoleMembershipsRepoInput {
            principal_id: TEST_USER_ID.to_string(),
        })
        .await
        .unwrap();
    assert!(listed.is_empty());
}
