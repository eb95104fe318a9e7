use std::collections::BTreeSet;

use crate::auth::enforce_exclusions;
use crate::domain::{
    CreateRoleRepoInput, DomainError, DomainResult, GetRoleByNameRepoInput, GetRoleRepoInput,
    ListRoleExclusionsRepoInput, Role, RoleExclusion, RoleExclusionRepoInput,
    RoleExclusionRepository, RoleRepository, UpdateRoleCapabilitiesRepoInput,
};
use crate::postgres::errors::{missing_reference, repository_error, violation, Violation};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const SELECT_ROLE: &str = "SELECT r.id, r.name,
        COALESCE(
            array_agg(rc.capability ORDER BY rc.capability) FILTER (WHERE rc.capability IS NOT NULL),
            '{}'::text[]
        ) AS capabilities
     FROM roles r
     LEFT JOIN role_capabilities rc ON rc.role_id = r.id";

fn role_from_row(row: &Row) -> Role {
    let capabilities: Vec<String> = row.get("capabilities");
    Role {
        id: row.get("id"),
        name: row.get("name"),
        capabilities: capabilities.into_iter().collect(),
    }
}

/// PostgreSQL implementation of RoleRepository and RoleExclusionRepository.
///
/// Every write that can collide with an exclusion locks the role row first,
/// so the exclusion check and the write commit together.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    client: PostgresClient,
}

impl PostgresRoleRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn lock_role(tx: &Transaction<'_>, role_id: &str) -> DomainResult<()> {
        let row = tx
            .query_opt("SELECT id FROM roles WHERE id = $1 FOR UPDATE", &[&role_id])
            .await
            .map_err(repository_error)?;

        match row {
            Some(_) => Ok(()),
            None => Err(DomainError::RoleNotFound(role_id.to_string())),
        }
    }

    async fn require_capabilities(tx: &Transaction<'_>, capabilities: &[String]) -> DomainResult<()> {
        let rows = tx
            .query(
                "SELECT codename FROM capabilities WHERE codename = ANY($1)",
                &[&capabilities],
            )
            .await
            .map_err(repository_error)?;

        let known: BTreeSet<String> = rows.iter().map(|row| row.get("codename")).collect();
        match capabilities.iter().find(|c| !known.contains(*c)) {
            Some(unknown) => Err(DomainError::InvalidCapability(unknown.clone())),
            None => Ok(()),
        }
    }

    async fn guard(tx: &Transaction<'_>, role_id: &str, requested: &[String]) -> DomainResult<()> {
        let rows = tx
            .query(
                "SELECT capability FROM role_exclusions
                 WHERE role_id = $1 AND capability = ANY($2)",
                &[&role_id, &requested],
            )
            .await
            .map_err(repository_error)?;

        let excluded: BTreeSet<String> = rows.iter().map(|row| row.get("capability")).collect();
        enforce_exclusions(role_id, requested, &excluded)
    }

    async fn fetch_role(tx: &Transaction<'_>, role_id: &str) -> DomainResult<Role> {
        let row = tx
            .query_opt(
                format!("{SELECT_ROLE} WHERE r.id = $1 GROUP BY r.id, r.name").as_str(),
                &[&role_id],
            )
            .await
            .map_err(repository_error)?;

        row.map(|row| role_from_row(&row))
            .ok_or_else(|| DomainError::RoleNotFound(role_id.to_string()))
    }

    /// Guarded write: lock, validate, check exclusions, then apply `replace` or add
    async fn write_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
        replace: bool,
    ) -> DomainResult<Role> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;

        Self::lock_role(&tx, &input.role_id).await?;
        Self::require_capabilities(&tx, &input.capabilities).await?;
        Self::guard(&tx, &input.role_id, &input.capabilities).await?;

        if replace {
            tx.execute(
                "DELETE FROM role_capabilities
                 WHERE role_id = $1 AND NOT (capability = ANY($2))",
                &[&input.role_id, &input.capabilities],
            )
            .await
            .map_err(repository_error)?;
        }

        tx.execute(
            "INSERT INTO role_capabilities (role_id, capability)
             SELECT $1, unnest($2::text[])
             ON CONFLICT DO NOTHING",
            &[&input.role_id, &input.capabilities],
        )
        .await
        .map_err(repository_error)?;

        let role = Self::fetch_role(&tx, &input.role_id).await?;
        tx.commit().await.map_err(repository_error)?;

        debug!(count = role.capabilities.len(), replace, "role capabilities written");
        Ok(role)
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    #[instrument(skip(self, input), fields(role_id = %input.id, name = %input.name))]
    async fn create_role(&self, input: CreateRoleRepoInput) -> DomainResult<Role> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let result = conn
            .execute(
                "INSERT INTO roles (id, name) VALUES ($1, $2)",
                &[&input.id, &input.name],
            )
            .await;

        if let Err(e) = result {
            if let Some(Violation::Unique(_)) = violation(&e) {
                return Err(DomainError::RoleAlreadyExists(input.name));
            }
            return Err(repository_error(e));
        }

        debug!("role created in database");

        Ok(Role {
            id: input.id,
            name: input.name,
            capabilities: BTreeSet::new(),
        })
    }

    #[instrument(skip(self), fields(role_id = %input.role_id))]
    async fn get_role(&self, input: GetRoleRepoInput) -> DomainResult<Option<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                format!("{SELECT_ROLE} WHERE r.id = $1 GROUP BY r.id, r.name").as_str(),
                &[&input.role_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(row.map(|row| role_from_row(&row)))
    }

    #[instrument(skip(self), fields(name = %input.name))]
    async fn get_role_by_name(&self, input: GetRoleByNameRepoInput) -> DomainResult<Option<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                format!("{SELECT_ROLE} WHERE r.name = $1 GROUP BY r.id, r.name").as_str(),
                &[&input.name],
            )
            .await
            .map_err(repository_error)?;

        Ok(row.map(|row| role_from_row(&row)))
    }

    #[instrument(skip(self))]
    async fn list_roles(&self) -> DomainResult<Vec<Role>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                format!("{SELECT_ROLE} GROUP BY r.id, r.name ORDER BY r.name").as_str(),
                &[],
            )
            .await
            .map_err(repository_error)?;

        Ok(rows.iter().map(role_from_row).collect())
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn add_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        self.write_capabilities(input, false).await
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn remove_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;

        tx.execute(
            "DELETE FROM role_capabilities WHERE role_id = $1 AND capability = ANY($2)",
            &[&input.role_id, &input.capabilities],
        )
        .await
        .map_err(repository_error)?;

        let role = Self::fetch_role(&tx, &input.role_id).await?;
        tx.commit().await.map_err(repository_error)?;

        debug!(count = role.capabilities.len(), "role capabilities removed");
        Ok(role)
    }

    #[instrument(skip(self, input), fields(role_id = %input.role_id))]
    async fn set_role_capabilities(
        &self,
        input: UpdateRoleCapabilitiesRepoInput,
    ) -> DomainResult<Role> {
        self.write_capabilities(input, true).await
    }
}

#[async_trait]
impl RoleExclusionRepository for PostgresRoleRepository {
    #[instrument(skip(self), fields(role_id = %input.role_id, capability = %input.capability))]
    async fn add_role_exclusion(
        &self,
        input: RoleExclusionRepoInput,
    ) -> DomainResult<RoleExclusion> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;

        // Serializes with concurrent guarded capability writes on the same role
        Self::lock_role(&tx, &input.role_id).await?;

        let result = tx
            .execute(
                "INSERT INTO role_exclusions (role_id, capability)
                 VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
                &[&input.role_id, &input.capability],
            )
            .await;

        if let Err(e) = result {
            if let Some(Violation::ForeignKey(constraint)) = violation(&e) {
                if let Some(err) =
                    missing_reference(constraint, "", "", &input.role_id, &input.capability)
                {
                    return Err(err);
                }
            }
            return Err(repository_error(e));
        }

        tx.commit().await.map_err(repository_error)?;
        debug!("role exclusion stored");

        Ok(RoleExclusion {
            role_id: input.role_id,
            capability: input.capability,
        })
    }

    #[instrument(skip(self), fields(role_id = %input.role_id, capability = %input.capability))]
    async fn remove_role_exclusion(&self, input: RoleExclusionRepoInput) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows_affected = conn
            .execute(
                "DELETE FROM role_exclusions WHERE role_id = $1 AND capability = $2",
                &[&input.role_id, &input.capability],
            )
            .await
            .map_err(repository_error)?;

        debug!(removed = rows_affected > 0, "role exclusion removed");
        Ok(rows_affected > 0)
    }

    #[instrument(skip(self), fields(role_id = %input.role_id))]
    async fn list_role_exclusions(
        &self,
        input: ListRoleExclusionsRepoInput,
    ) -> DomainResult<Vec<RoleExclusion>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT role_id, capability FROM role_exclusions
                 WHERE role_id = $1
                 ORDER BY capability",
                &[&input.role_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(rows
            .iter()
            .map(|row| RoleExclusion {
                role_id: row.get("role_id"),
                capability: row.get("capability"),
            })
            .collect())
    }
}
