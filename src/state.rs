use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio_util::task::TaskTracker;

use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use crate::services::ServiceContext;

pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub services: ServiceContext,
    pub limiter: Arc<RateLimiter>,
    /// Detached background work (usage stamps, retries) drains through this
    /// tracker on shutdown.
    pub tracker: TaskTracker,
    /// Present only when connected to a real Postgres pool; mock-backed
    /// tests leave it empty.
    pub pg_pool: Option<sea_orm::sqlx::PgPool>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        services: ServiceContext,
        limiter: Arc<RateLimiter>,
        tracker: TaskTracker,
        pg_pool: Option<sea_orm::sqlx::PgPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            services,
            limiter,
            tracker,
            pg_pool,
        })
    }
}
