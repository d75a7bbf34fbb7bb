//! Shared fixtures for integration tests: a mock-backed application state
//! with an on-disk object store rooted at a caller-provided directory and an
//! in-process job broker.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use tokio_util::task::TaskTracker;

use crate::auth::jwt::JwtKeys;
use crate::config::{
    AppConfig, AuthConfig, DatabaseConfig, GeneralConfig, LimiterConfig, LoggingConfig,
    MailConfig, StorageConfig, StorageType,
};
use crate::filestore::ObjectFileStore;
use crate::jobs::{JobBroker, QueueReceivers};
use crate::middleware::RateLimiter;
use crate::routes::router;
use crate::services::ServiceContext;
use crate::state::AppState;

pub const TEST_JWT_SECRET: &[u8] = b"test-secret";

pub fn test_config(uploads_dir: &str) -> AppConfig {
    AppConfig {
        general: GeneralConfig {
            port: 8080,
            domain: "localhost".to_string(),
            environment: "testing".to_string(),
            version: "test".to_string(),
            project_name: "filevault".to_string(),
        },
        logging: LoggingConfig {
            rust_log: "error".to_string(),
        },
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "filevault_test".to_string(),
            username: "filevault".to_string(),
            password: "filevault".to_string(),
            schema: "public".to_string(),
            max_connections: 5,
            min_idle: 1,
            max_lifetime_secs: 60,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_vec(),
        },
        storage: StorageConfig {
            storage_type: StorageType::Local,
            uploads_dir: uploads_dir.to_string(),
            max_upload_size: 10 * 1024 * 1024,
            s3_access_key: None,
            s3_secret_key: None,
            s3_endpoint: None,
            s3_region: None,
            s3_bucket: None,
        },
        mail: MailConfig {
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            sender: "noreply@example.com".to_string(),
        },
        limiter: LimiterConfig {
            rps: 1000.0,
            burst: 1000,
            enabled: false,
        },
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub receivers: QueueReceivers,
}

impl TestApp {
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }
}

/// Builds a full application over a mock database and a disk store rooted at
/// `uploads_dir` (usually a tempdir owned by the test).
pub fn test_app(db: DatabaseConnection, uploads_dir: &Path) -> TestApp {
    let cfg = test_config(uploads_dir.to_str().expect("uploads dir path"));

    let store = Arc::new(ObjectFileStore::new(Arc::new(
        object_store::local::LocalFileSystem::new_with_prefix(uploads_dir).expect("local store"),
    )));
    let (broker, receivers) = JobBroker::new();
    let tracker = TaskTracker::new();

    let services = ServiceContext::new(
        &db,
        store,
        broker,
        JwtKeys::from_secret(TEST_JWT_SECRET),
        "fv9a4f".to_string(),
        tracker.clone(),
        cfg.storage.max_upload_size,
    );

    let limiter = Arc::new(RateLimiter::new(
        cfg.limiter.rps,
        cfg.limiter.burst,
        cfg.limiter.enabled,
    ));

    let state = AppState::new(cfg, db, services, limiter, tracker, None);

    TestApp { state, receivers }
}
