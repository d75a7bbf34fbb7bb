mod action_token_dao;
mod api_key_dao;
mod base;
mod base_traits;
mod cleanup;
mod error;
mod file_dao;
mod refresh_token_dao;
mod user_dao;

pub use action_token_dao::ActionTokenDao;
pub use api_key_dao::ApiKeyDao;
pub use base::{DaoBase, PaginatedResponse};
pub use cleanup::{run_all_cleanups, CleanupCounts};
pub use error::{DaoLayerError, DaoResult};
pub use file_dao::{FileDao, NewFile};
pub use refresh_token_dao::{RefreshTokenDao, REFRESH_TTL_DAYS};
pub use user_dao::UserDao;

use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct DaoContext {
    db: DatabaseConnection,
}

impl DaoContext {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    pub fn user(&self) -> UserDao {
        UserDao::new(&self.db)
    }

    pub fn refresh_token(&self) -> RefreshTokenDao {
        RefreshTokenDao::new(&self.db)
    }

    pub fn action_token(&self) -> ActionTokenDao {
        ActionTokenDao::new(&self.db)
    }

    pub fn api_key(&self) -> ApiKeyDao {
        ApiKeyDao::new(&self.db)
    }

    pub fn file(&self) -> FileDao {
        FileDao::new(&self.db)
    }
}
