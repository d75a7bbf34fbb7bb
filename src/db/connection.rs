use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::db::migration::Migrator;

const MIGRATION_ATTEMPTS: u32 = 10;
const MIGRATION_BACKOFF: Duration = Duration::from_secs(2);

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(cfg.url());
    options
        .max_connections(cfg.max_connections)
        .min_connections(cfg.min_idle)
        .max_lifetime(Duration::from_secs(cfg.max_lifetime_secs))
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    info!(host = %cfg.host, database = %cfg.name, "connecting to database");
    let db = Database::connect(options).await?;

    migrate_with_retry(&db).await?;
    Ok(db)
}

/// The database may still be coming up when the service starts; migrations
/// are idempotent, so retry a bounded number of times before giving up.
pub async fn migrate_with_retry(db: &DatabaseConnection) -> anyhow::Result<()> {
    let mut attempt = 1;
    loop {
        match Migrator::up(db, None).await {
            Ok(()) => {
                info!("database migrations applied");
                return Ok(());
            }
            Err(err) if attempt < MIGRATION_ATTEMPTS => {
                warn!(attempt, error = %err, "migration attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(MIGRATION_BACKOFF).await;
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "failed to run migrations after {MIGRATION_ATTEMPTS} attempts: {err}"
                ));
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub status: &'static str,
    pub open_connections: u32,
    pub idle_connections: usize,
}

/// Connection-pool statistics for the health probe. `None` when the state
/// was built without a real pool (mock-backed tests).
pub fn pool_stats(pool: Option<&sea_orm::sqlx::PgPool>) -> Option<PoolStats> {
    pool.map(|pool| PoolStats {
        status: "up",
        open_connections: pool.size(),
        idle_connections: pool.num_idle(),
    })
}
