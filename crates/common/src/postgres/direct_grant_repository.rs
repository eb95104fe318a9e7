use crate::domain::{
    DirectGrant, DirectGrantRepository, DomainError, DomainResult, ListDirectGrantsRepoInput,
    SetDirectGrantRepoInput,
};
use crate::postgres::errors::{missing_reference, repository_error, violation, Violation};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Direct grant row for PostgreSQL storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectGrantRow {
    pub id: String,
    pub principal_id: String,
    pub business_id: String,
    pub capability: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for DirectGrantRow {
    fn from(row: &Row) -> Self {
        DirectGrantRow {
            id: row.get("id"),
            principal_id: row.get("principal_id"),
            business_id: row.get("business_id"),
            capability: row.get("capability"),
            active: row.get("active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<DirectGrantRow> for DirectGrant {
    fn from(row: DirectGrantRow) -> Self {
        DirectGrant {
            id: row.id,
            principal_id: row.principal_id,
            business_id: row.business_id,
            capability: row.capability,
            active: row.active,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// PostgreSQL implementation of DirectGrantRepository trait
#[derive(Clone)]
pub struct PostgresDirectGrantRepository {
    client: PostgresClient,
}

impl PostgresDirectGrantRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn upsert(
        tx: &Transaction<'_>,
        input: &SetDirectGrantRepoInput,
        now: DateTime<Utc>,
    ) -> DomainResult<DirectGrant> {
        let result = tx
            .query_one(
                "INSERT INTO direct_grants
                    (id, principal_id, business_id, capability, active, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $6)
                 ON CONFLICT (principal_id, business_id, capability)
                 DO UPDATE SET active = EXCLUDED.active, updated_at = EXCLUDED.updated_at
                 RETURNING id, principal_id, business_id, capability, active, created_at, updated_at",
                &[
                    &input.id,
                    &input.principal_id,
                    &input.business_id,
                    &input.capability,
                    &input.active,
                    &now,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(DirectGrantRow::from(&row).into()),
            Err(e) => {
                if let Some(Violation::ForeignKey(constraint)) = violation(&e) {
                    if let Some(err) = missing_reference(
                        constraint,
                        &input.principal_id,
                        &input.business_id,
                        "",
                        &input.capability,
                    ) {
                        return Err(err);
                    }
                }
                Err(repository_error(e))
            }
        }
    }
}

#[async_trait]
impl DirectGrantRepository for PostgresDirectGrantRepository {
    #[instrument(skip(self, input), fields(principal_id = %input.principal_id, business_id = %input.business_id, capability = %input.capability, active = input.active))]
    async fn set_direct_grant(&self, input: SetDirectGrantRepoInput) -> DomainResult<DirectGrant> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;
        let grant = Self::upsert(&tx, &input, Utc::now()).await?;
        tx.commit().await.map_err(repository_error)?;

        debug!("direct grant stored");
        Ok(grant)
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    async fn set_direct_grants(
        &self,
        inputs: Vec<SetDirectGrantRepoInput>,
    ) -> DomainResult<Vec<DirectGrant>> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        // Dropping the transaction on the first error rolls back earlier entries
        let tx = conn.transaction().await.map_err(repository_error)?;
        let now = Utc::now();
        let mut grants = Vec::with_capacity(inputs.len());
        for input in &inputs {
            grants.push(Self::upsert(&tx, input, now).await?);
        }
        tx.commit().await.map_err(repository_error)?;

        debug!(count = grants.len(), "direct grants stored");
        Ok(grants)
    }

    #[instrument(skip(self), fields(principal_id = %input.principal_id))]
    async fn list_direct_grants(
        &self,
        input: ListDirectGrantsRepoInput,
    ) -> DomainResult<Vec<DirectGrant>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, principal_id, business_id, capability, active, created_at, updated_at
                 FROM direct_grants
                 WHERE principal_id = $1
                 ORDER BY business_id, capability",
                &[&input.principal_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(rows.iter().map(|row| DirectGrantRow::from(row).into()).collect())
    }
}
