use crate::domain::{
    Capability, CapabilityRepository, DomainError, DomainResult, RegisterCapabilityRepoInput,
};
use crate::postgres::errors::repository_error;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL implementation of the capability catalog
#[derive(Clone)]
pub struct PostgresCapabilityRepository {
    client: PostgresClient,
}

impl PostgresCapabilityRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityRepository for PostgresCapabilityRepository {
    #[instrument(skip(self), fields(codename = %input.codename))]
    async fn register_capability(
        &self,
        input: RegisterCapabilityRepoInput,
    ) -> DomainResult<Capability> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        // DO UPDATE with a no-op assignment so RETURNING yields the existing row
        let row = conn
            .query_one(
                "INSERT INTO capabilities (codename, name)
                 VALUES ($1, $2)
                 ON CONFLICT (codename) DO UPDATE SET codename = EXCLUDED.codename
                 RETURNING codename, name",
                &[&input.codename, &input.name],
            )
            .await
            .map_err(repository_error)?;

        debug!("capability registered");

        Ok(Capability {
            codename: row.get("codename"),
            name: row.get("name"),
        })
    }

    #[instrument(skip(self))]
    async fn get_capability(&self, codename: &str) -> DomainResult<Option<Capability>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT codename, name FROM capabilities WHERE codename = $1",
                &[&codename],
            )
            .await
            .map_err(repository_error)?;

        Ok(row.map(|row| Capability {
            codename: row.get("codename"),
            name: row.get("name"),
        }))
    }

    #[instrument(skip(self))]
    async fn list_capabilities(&self) -> DomainResult<Vec<Capability>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT codename, name FROM capabilities ORDER BY codename",
                &[],
            )
            .await
            .map_err(repository_error)?;

        Ok(rows
            .iter()
            .map(|row| Capability {
                codename: row.get("codename"),
                name: row.get("name"),
            })
            .collect())
    }
}
