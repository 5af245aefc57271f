use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

use crate::config::Database as DatabaseConfig;
use crate::migration::{Migrator, MigratorTrait};

#[derive(Clone)]
pub struct DatabaseService {
    pub connection: DatabaseConnection,
}

impl DatabaseService {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut opt = ConnectOptions::new(&config.url);
        opt.connect_timeout(Duration::from_secs(config.connect_timeout))
            .sqlx_logging(false);

        // Every pooled connection to `sqlite::memory:` is its own database,
        // so the pool is pinned to a single connection.
        if config.url.starts_with("sqlite::memory:") {
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(config.max_connections)
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(3600));
        }

        info!("[database] connecting: {}", config.url);
        let connection = Database::connect(opt).await?;

        info!("[database] running migrations");
        Migrator::up(&connection, None).await?;

        Ok(Self { connection })
    }
}
