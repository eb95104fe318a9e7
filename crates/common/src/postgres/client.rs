use anyhow::Result;
use deadpool_postgres::{Pool, Runtime, Status};
use tokio_postgres::NoTls;
use tracing::{debug, instrument};

use crate::postgres::PostgresConfig;

/// Pooled connection handle shared by every PostgreSQL repository.
///
/// Cloning is cheap; clones share one pool.
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Builds the pool from `config`. No connection is opened until first use.
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = config
            .pool_config()
            .create_pool(Some(Runtime::Tokio1), NoTls)?;
        debug!(
            host = %config.host,
            database = %config.database,
            max_pool_size = config.max_pool_size,
            "postgres pool created"
        );
        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgres reachable");
        Ok(())
    }

    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }

    pub fn status(&self) -> Status {
        self.pool.status()
    }
}
