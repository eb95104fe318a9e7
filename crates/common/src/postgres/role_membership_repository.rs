use crate::domain::{
    DomainError, DomainResult, ListRoleMembershipsRepoInput, RoleMembership,
    RoleMembershipRepository, SetRoleMembershipRepoInput,
};
use crate::postgres::errors::{missing_reference, repository_error, violation, Violation};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tracing::{debug, instrument};

fn membership_from_row(row: &Row) -> RoleMembership {
    RoleMembership {
        id: row.get("id"),
        principal_id: row.get("principal_id"),
        role_id: row.get("role_id"),
        business_id: row.get("business_id"),
        active: row.get("active"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

/// PostgreSQL implementation of RoleMembershipRepository trait
#[derive(Clone)]
pub struct PostgresRoleMembershipRepository {
    client: PostgresClient,
}

impl PostgresRoleMembershipRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn upsert(
        tx: &Transaction<'_>,
        input: &SetRoleMembershipRepoInput,
        now: DateTime<Utc>,
    ) -> DomainResult<RoleMembership> {
        let result = tx
            .query_one(
                "INSERT INTO role_memberships
                    (id, principal_id, role_id, business_id, active, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $6)
                 ON CONFLICT (principal_id, role_id, business_id)
                 DO UPDATE SET active = EXCLUDED.active, updated_at = EXCLUDED.updated_at
                 RETURNING id, principal_id, role_id, business_id, active, created_at, updated_at",
                &[
                    &input.id,
                    &input.principal_id,
                    &input.role_id,
                    &input.business_id,
                    &input.active,
                    &now,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(membership_from_row(&row)),
            Err(e) => {
                if let Some(Violation::ForeignKey(constraint)) = violation(&e) {
                    if let Some(err) = missing_reference(
                        constraint,
                        &input.principal_id,
                        &input.business_id,
                        &input.role_id,
                        "",
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
impl RoleMembershipRepository for PostgresRoleMembershipRepository {
    #[instrument(skip(self, input), fields(principal_id = %input.principal_id, role_id = %input.role_id, business_id = %input.business_id, active = input.active))]
    async fn set_role_membership(
        &self,
        input: SetRoleMembershipRepoInput,
    ) -> DomainResult<RoleMembership> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;
        let membership = Self::upsert(&tx, &input, Utc::now()).await?;
        tx.commit().await.map_err(repository_error)?;

        debug!("role membership stored");
        Ok(membership)
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    async fn set_role_memberships(
        &self,
        inputs: Vec<SetRoleMembershipRepoInput>,
    ) -> DomainResult<Vec<RoleMembership>> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repository_error)?;
        let now = Utc::now();
        let mut memberships = Vec::with_capacity(inputs.len());
        for input in &inputs {
            memberships.push(Self::upsert(&tx, input, now).await?);
        }
        tx.commit().await.map_err(repository_error)?;

        debug!(count = memberships.len(), "role memberships stored");
        Ok(memberships)
    }

    #[instrument(skip(self), fields(principal_id = %input.principal_id))]
    async fn list_role_memberships(
        &self,
        input: ListRoleMembershipsRepoInput,
    ) -> DomainResult<Vec<RoleMembership>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, principal_id, role_id, business_id, active, created_at, updated_at
                 FROM role_memberships
                 WHERE principal_id = $1
                 ORDER BY business_id, role_id",
                &[&input.principal_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(rows.iter().map(membership_from_row).collect())
    }
}
