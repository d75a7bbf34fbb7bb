use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::base_traits::{HasCreatedAtColumn, HasIdActiveModel, TimestampedActiveModel};
use super::{DaoBase, DaoLayerError, DaoResult};
use crate::auth::TokenPurpose;
use crate::db::entities::action_token::{self, Entity as ActionToken};

impl HasCreatedAtColumn for ActionToken {
    fn created_at_column() -> action_token::Column {
        action_token::Column::CreatedAt
    }
}

impl HasIdActiveModel for action_token::ActiveModel {
    fn set_id(&mut self, id: Uuid) {
        self.token_id = Set(id);
    }
}

impl TimestampedActiveModel for action_token::ActiveModel {
    fn set_created_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }
}

#[derive(Clone)]
pub struct ActionTokenDao {
    db: DatabaseConnection,
}

impl DaoBase for ActionTokenDao {
    type Entity = ActionToken;

    fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl ActionTokenDao {
    pub async fn create_action_token(
        &self,
        user_id: &Uuid,
        purpose: TokenPurpose,
        token_hash: &[u8],
        expires_at: DateTime<FixedOffset>,
    ) -> DaoResult<action_token::Model> {
        let model = action_token::ActiveModel {
            user_id: Set(*user_id),
            purpose: Set(purpose.as_str().to_string()),
            token_hash: Set(token_hash.to_vec()),
            expires_at: Set(expires_at),
            used: Set(false),
            ..Default::default()
        };
        self.create(model).await
    }

    /// Looks up an unexpired token by digest, purpose, and owner.
    pub async fn find_valid(
        &self,
        user_id: &Uuid,
        purpose: TokenPurpose,
        token_hash: &[u8],
    ) -> DaoResult<Option<action_token::Model>> {
        ActionToken::find()
            .filter(action_token::Column::TokenHash.eq(token_hash.to_vec()))
            .filter(action_token::Column::Purpose.eq(purpose.as_str()))
            .filter(action_token::Column::UserId.eq(*user_id))
            .filter(action_token::Column::Used.eq(false))
            .filter(action_token::Column::ExpiresAt.gt(Utc::now().fixed_offset()))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    /// Deletes a consumed token row; zero rows means another consumer won.
    pub async fn delete_consumed(&self, user_id: &Uuid, token_hash: &[u8]) -> DaoResult<u64> {
        let result = ActionToken::delete_many()
            .filter(action_token::Column::TokenHash.eq(token_hash.to_vec()))
            .filter(action_token::Column::UserId.eq(*user_id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

    use super::{ActionTokenDao, DaoBase};
    use crate::auth::TokenPurpose;
    use crate::db::entities::action_token;

    fn ts() -> chrono::DateTime<chrono::FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    fn token_model(user_id: Uuid) -> action_token::Model {
        let now = ts();
        action_token::Model {
            token_id: Uuid::new_v4(),
            user_id,
            purpose: "email_verification".to_string(),
            token_hash: vec![7u8; 32],
            created_at: now,
            expires_at: now + Duration::hours(24),
            used: false,
        }
    }

    #[tokio::test]
    async fn find_valid_filters_on_hash_purpose_user_and_expiry() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[token_model(user_id)]])
            .into_connection();
        let dao = ActionTokenDao::new(&db);

        let found = dao
            .find_valid(&user_id, TokenPurpose::EmailVerification, &[7u8; 32])
            .await
            .expect("query should succeed");
        assert!(found.is_some());

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("token_hash"));
        assert!(sql.contains("purpose"));
        assert!(sql.contains("user_id"));
        assert!(sql.contains("expires_at"));
    }

    #[tokio::test]
    async fn delete_consumed_reports_zero_when_already_deleted() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let dao = ActionTokenDao::new(&db);

        let rows = dao
            .delete_consumed(&Uuid::new_v4(), &[7u8; 32])
            .await
            .expect("delete should succeed");
        assert_eq!(rows, 0);
    }
}
