use crate::domain::{
    AccessFactRepository, AccessFacts, DomainError, DomainResult, LoadAccessFactsRepoInput,
    RoleGrantFact,
};
use crate::postgres::errors::repository_error;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::IsolationLevel;
use tracing::{debug, instrument};

/// Reads every fact an authorization decision needs from one snapshot
#[derive(Clone)]
pub struct PostgresAccessFactRepository {
    client: PostgresClient,
}

impl PostgresAccessFactRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccessFactRepository for PostgresAccessFactRepository {
    #[instrument(skip(self, input), fields(principal_id = %input.principal_id, capability = %input.capability, business_id = ?input.business_id))]
    async fn load_access_facts(&self, input: LoadAccessFactsRepoInput) -> DomainResult<AccessFacts> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await
            .map_err(repository_error)?;

        let capability_exists: bool = tx
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM capabilities WHERE codename = $1) AS present",
                &[&input.capability],
            )
            .await
            .map_err(repository_error)?
            .get("present");

        let direct_grants: Vec<String> = tx
            .query(
                "SELECT business_id FROM direct_grants
                 WHERE principal_id = $1
                   AND capability = $2
                   AND active
                   AND ($3::text IS NULL OR business_id = $3)
                 ORDER BY business_id",
                &[&input.principal_id, &input.capability, &input.business_id],
            )
            .await
            .map_err(repository_error)?
            .iter()
            .map(|row| row.get("business_id"))
            .collect();

        let role_grants: Vec<RoleGrantFact> = tx
            .query(
                "SELECT m.business_id, m.role_id,
                        EXISTS (
                            SELECT 1 FROM role_capabilities rc
                            WHERE rc.role_id = m.role_id AND rc.capability = $2
                        ) AS role_has_capability,
                        EXISTS (
                            SELECT 1 FROM role_exclusions re
                            WHERE re.role_id = m.role_id AND re.capability = $2
                        ) AS excluded
                 FROM role_memberships m
                 WHERE m.principal_id = $1
                   AND m.active
                   AND ($3::text IS NULL OR m.business_id = $3)
                 ORDER BY m.business_id, m.role_id",
                &[&input.principal_id, &input.capability, &input.business_id],
            )
            .await
            .map_err(repository_error)?
            .iter()
            .map(|row| RoleGrantFact {
                business_id: row.get("business_id"),
                role_id: row.get("role_id"),
                role_has_capability: row.get("role_has_capability"),
                excluded: row.get("excluded"),
            })
            .collect();

        tx.commit().await.map_err(repository_error)?;

        debug!(
            capability_exists,
            direct = direct_grants.len(),
            memberships = role_grants.len(),
            "loaded access facts"
        );

        Ok(AccessFacts {
            capability_exists,
            direct_grants,
            role_grants,
        })
    }

    #[instrument(skip(self))]
    async fn list_tenant_ids(&self) -> DomainResult<Vec<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query("SELECT id FROM businesses ORDER BY id", &[])
            .await
            .map_err(repository_error)?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
