mod config;
mod seed;

use std::time::Duration;

use common::postgres::{
    MigrationRunner, PostgresCapabilityRepository, PostgresClient, PostgresRoleRepository,
};
use common::telemetry::{init_telemetry, TelemetryConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match config::ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: config.service_name.clone(),
        log_level: config.log_level.clone(),
        json: config.log_json,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!("Starting assetkeep init process");
    debug!("Configuration: {:?}", config);

    let postgres_config = config.postgres();
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    let client = match PostgresClient::new(&postgres_config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create PostgreSQL client: {}", e);
            std::process::exit(1);
        }
    };

    match tokio::time::timeout(startup_timeout, client.ping()).await {
        Ok(Ok(())) => info!("Connected to PostgreSQL"),
        Ok(Err(e)) => {
            error!("Failed to connect to PostgreSQL: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            error!(
                timeout_secs = config.startup_timeout_secs,
                "Timed out connecting to PostgreSQL"
            );
            std::process::exit(1);
        }
    }

    let migrations = MigrationRunner::from_config(&postgres_config);
    match tokio::time::timeout(startup_timeout, migrations.run_migrations()).await {
        Ok(Ok(())) => info!("Database migrations completed"),
        Ok(Err(e)) => {
            error!("Failed to run migrations: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            error!(
                timeout_secs = config.startup_timeout_secs,
                "Timed out running migrations"
            );
            std::process::exit(1);
        }
    }

    let capabilities = PostgresCapabilityRepository::new(client.clone());
    let roles = PostgresRoleRepository::new(client);

    match seed::seed_defaults(&capabilities, &roles, &config.role_names()).await {
        Ok(report) => info!(
            capabilities = report.capabilities,
            roles_created = ?report.roles_created,
            "Init process finished"
        ),
        Err(e) => {
            error!("Failed to seed defaults: {}", e);
            std::process::exit(1);
        }
    }
}
