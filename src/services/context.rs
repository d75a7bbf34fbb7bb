use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio_util::task::TaskTracker;

use crate::auth::jwt::JwtKeys;
use crate::db::dao::DaoContext;
use crate::filestore::FileStore;
use crate::jobs::JobBroker;
use crate::services::{
    api_key_service::ApiKeyService, auth_service::AuthService, file_service::FileService,
    user_service::UserService,
};

/// Wires DAOs and shared infrastructure into per-request service values.
/// Cloning is cheap; services are built on demand.
#[derive(Clone)]
pub struct ServiceContext {
    daos: DaoContext,
    store: Arc<dyn FileStore>,
    broker: JobBroker,
    jwt: JwtKeys,
    api_key_prefix: String,
    tracker: TaskTracker,
    max_upload_size: u64,
}

impl ServiceContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: &DatabaseConnection,
        store: Arc<dyn FileStore>,
        broker: JobBroker,
        jwt: JwtKeys,
        api_key_prefix: String,
        tracker: TaskTracker,
        max_upload_size: u64,
    ) -> Self {
        Self {
            daos: DaoContext::new(db),
            store,
            broker,
            jwt,
            api_key_prefix,
            tracker,
            max_upload_size,
        }
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(
            self.daos.user(),
            self.daos.refresh_token(),
            self.daos.action_token(),
            self.jwt.clone(),
            self.broker.clone(),
        )
    }

    pub fn user(&self) -> UserService {
        UserService::new(self.daos.user(), self.daos.action_token())
    }

    pub fn api_key(&self) -> ApiKeyService {
        ApiKeyService::new(
            self.daos.api_key(),
            self.daos.user(),
            self.api_key_prefix.clone(),
            self.tracker.clone(),
        )
    }

    pub fn file(&self) -> FileService {
        FileService::new(
            self.daos.file(),
            Arc::clone(&self.store),
            self.broker.clone(),
            self.max_upload_size,
        )
    }

    pub fn jwt_keys(&self) -> &JwtKeys {
        &self.jwt
    }
}
