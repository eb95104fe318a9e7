use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

use crate::postgres::PostgresConfig;

/// Runs goose SQL migrations against PostgreSQL by spawning the goose binary
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            dsn,
        }
    }

    pub fn from_config(config: &PostgresConfig) -> Self {
        Self::new(
            config.goose_binary_path.clone(),
            config.migrations_dir.clone(),
            config.dsn(),
        )
    }

    /// Applies all pending migrations (`goose up`)
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running migrations");
        let stdout = self.goose("up").await?;
        debug!("migrations completed:\n{}", stdout);
        Ok(())
    }

    /// Rolls back the most recent migration (`goose down`)
    pub async fn rollback_migration(&self) -> Result<()> {
        debug!("rolling back most recent migration");
        let stdout = self.goose("down").await?;
        debug!("rollback completed:\n{}", stdout);
        Ok(())
    }

    /// Current migration status as printed by goose
    pub async fn migration_status(&self) -> Result<String> {
        self.goose("status").await
    }

    fn args<'a>(&'a self, command: &'a str) -> [&'a str; 5] {
        [
            "-dir",
            self.migrations_dir.as_str(),
            "postgres",
            self.dsn.as_str(),
            command,
        ]
    }

    async fn goose(&self, command: &str) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("goose {command} failed.\nstdout: {stdout}\nstderr: {stderr}");
        }
        Ok(stdout)
    }
}
