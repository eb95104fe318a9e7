use crate::domain::{
    CreatePrincipalRepoInput, DomainError, DomainResult, GetPrincipalRepoInput, PrincipalRecord,
    PrincipalRepository,
};
use crate::postgres::errors::{repository_error, violation, Violation};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

/// PostgreSQL implementation of PrincipalRepository backed by the `users` table
#[derive(Clone)]
pub struct PostgresPrincipalRepository {
    client: PostgresClient,
}

impl PostgresPrincipalRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PrincipalRepository for PostgresPrincipalRepository {
    #[instrument(skip(self, input), fields(principal_id = %input.id, email = %input.email))]
    async fn create_principal(
        &self,
        input: CreatePrincipalRepoInput,
    ) -> DomainResult<PrincipalRecord> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .execute(
                "INSERT INTO users (id, email, active, superuser, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[&input.id, &input.email, &input.active, &input.superuser, &now],
            )
            .await;

        if let Err(e) = result {
            if let Some(Violation::Unique(_)) = violation(&e) {
                return Err(DomainError::PrincipalAlreadyExists(input.id));
            }
            return Err(repository_error(e));
        }

        debug!("principal created in database");

        Ok(PrincipalRecord {
            id: input.id,
            email: input.email,
            active: input.active,
            superuser: input.superuser,
            created_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(principal_id = %input.principal_id))]
    async fn get_principal(
        &self,
        input: GetPrincipalRepoInput,
    ) -> DomainResult<Option<PrincipalRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, email, active, superuser, created_at
                 FROM users
                 WHERE id = $1",
                &[&input.principal_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(row.map(|row| PrincipalRecord {
            id: row.get("id"),
            email: row.get("email"),
            active: row.get("active"),
            superuser: row.get("superuser"),
            created_at: Some(row.get("created_at")),
        }))
    }
}
