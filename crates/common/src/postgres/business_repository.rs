use crate::domain::{
    Business, BusinessRepository, CreateBusinessRepoInput, DomainError, DomainResult,
    GetBusinessRepoInput,
};
use crate::postgres::errors::{repository_error, violation, Violation};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Business row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRow {
    pub id: String,
    pub name: String,
    pub tin: String,
    pub utr: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for BusinessRow {
    fn from(row: &Row) -> Self {
        BusinessRow {
            id: row.get("id"),
            name: row.get("name"),
            tin: row.get("tin"),
            utr: row.get("utr"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<BusinessRow> for Business {
    fn from(row: BusinessRow) -> Self {
        Business {
            id: row.id,
            name: row.name,
            tin: row.tin,
            utr: row.utr,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// PostgreSQL implementation of BusinessRepository trait
#[derive(Clone)]
pub struct PostgresBusinessRepository {
    client: PostgresClient,
}

impl PostgresBusinessRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BusinessRepository for PostgresBusinessRepository {
    #[instrument(skip(self, input), fields(business_id = %input.id, name = %input.name))]
    async fn create_business(&self, input: CreateBusinessRepoInput) -> DomainResult<Business> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let result = conn
            .execute(
                "INSERT INTO businesses (id, name, tin, utr, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[&input.id, &input.name, &input.tin, &input.utr, &now, &now],
            )
            .await;

        if let Err(e) = result {
            if let Some(Violation::Unique(_)) = violation(&e) {
                return Err(DomainError::BusinessAlreadyExists(input.id));
            }
            return Err(repository_error(e));
        }

        debug!("business created in database");

        Ok(Business {
            id: input.id,
            name: input.name,
            tin: input.tin,
            utr: input.utr,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(business_id = %input.business_id))]
    async fn get_business(&self, input: GetBusinessRepoInput) -> DomainResult<Option<Business>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT id, name, tin, utr, created_at, updated_at
                 FROM businesses
                 WHERE id = $1",
                &[&input.business_id],
            )
            .await
            .map_err(repository_error)?;

        Ok(row.map(|row| BusinessRow::from(&row).into()))
    }

    #[instrument(skip(self))]
    async fn list_businesses(&self) -> DomainResult<Vec<Business>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, name, tin, utr, created_at, updated_at
                 FROM businesses
                 ORDER BY name",
                &[],
            )
            .await
            .map_err(repository_error)?;

        let businesses: Vec<Business> = rows
            .iter()
            .map(|row| BusinessRow::from(row).into())
            .collect();

        debug!(count = businesses.len(), "listed businesses");
        Ok(businesses)
    }
}
