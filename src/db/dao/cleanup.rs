use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};

use super::{DaoLayerError, DaoResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub refresh_tokens_deleted: i32,
    pub action_tokens_deleted: i32,
    pub api_keys_deleted: i32,
}

/// Invokes the `run_all_cleanups()` routine installed by the migration,
/// which drains all three expired-token classes in a single transaction.
pub async fn run_all_cleanups(db: &DatabaseConnection) -> DaoResult<CleanupCounts> {
    let stmt = Statement::from_string(DbBackend::Postgres, "SELECT * FROM run_all_cleanups()");

    let row = db
        .query_one(stmt)
        .await
        .map_err(DaoLayerError::Db)?
        .ok_or_else(|| {
            DaoLayerError::Db(sea_orm::DbErr::Custom(
                "run_all_cleanups() returned no row".to_string(),
            ))
        })?;

    Ok(CleanupCounts {
        refresh_tokens_deleted: row
            .try_get("", "refresh_tokens_deleted")
            .map_err(DaoLayerError::Db)?,
        action_tokens_deleted: row
            .try_get("", "action_tokens_deleted")
            .map_err(DaoLayerError::Db)?,
        api_keys_deleted: row
            .try_get("", "api_keys_deleted")
            .map_err(DaoLayerError::Db)?,
    })
}
