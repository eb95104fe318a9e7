use common::auth::default_capabilities;
use common::domain::{
    CapabilityRepository, CreateRoleRepoInput, DomainError, DomainResult,
    GetRoleByNameRepoInput, RegisterCapabilityRepoInput, RoleRepository,
};
use tracing::{debug, info, instrument};

/// What a seeding run changed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub capabilities: usize,
    pub roles_created: Vec<String>,
}

/// Registers the default capability catalog and creates missing default roles.
///
/// Safe to run on every start: existing capabilities and roles are left alone.
#[instrument(skip(capabilities, roles), fields(role_count = role_names.len()))]
pub async fn seed_defaults(
    capabilities: &dyn CapabilityRepository,
    roles: &dyn RoleRepository,
    role_names: &[String],
) -> DomainResult<SeedReport> {
    let mut report = SeedReport::default();

    for capability in default_capabilities() {
        capabilities
            .register_capability(RegisterCapabilityRepoInput {
                codename: capability.codename,
                name: capability.name,
            })
            .await?;
        report.capabilities += 1;
    }

    for name in role_names {
        let existing = roles
            .get_role_by_name(GetRoleByNameRepoInput { name: name.clone() })
            .await?;
        if existing.is_some() {
            debug!(name = %name, "default role already present");
            continue;
        }

        let input = CreateRoleRepoInput {
            id: xid::new().to_string(),
            name: name.clone(),
        };
        match roles.create_role(input).await {
            Ok(role) => {
                debug!(role_id = %role.id, name = %role.name, "default role created");
                report.roles_created.push(role.name);
            }
            // Another instance won the race
            Err(DomainError::RoleAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
    }

    info!(
        capabilities = report.capabilities,
        roles_created = report.roles_created.len(),
        "seeding complete"
    );
    Ok(report)
}
