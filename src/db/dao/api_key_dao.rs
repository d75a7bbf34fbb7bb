use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use super::base_traits::{HasCreatedAtColumn, HasIdActiveModel, TimestampedActiveModel};
use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::api_key::{self, Entity as ApiKey};

impl HasCreatedAtColumn for ApiKey {
    fn created_at_column() -> api_key::Column {
        api_key::Column::CreatedAt
    }
}

impl HasIdActiveModel for api_key::ActiveModel {
    fn set_id(&mut self, id: Uuid) {
        self.api_key_id = Set(id);
    }
}

impl TimestampedActiveModel for api_key::ActiveModel {
    fn set_created_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }
}

#[derive(Clone)]
pub struct ApiKeyDao {
    db: DatabaseConnection,
}

impl DaoBase for ApiKeyDao {
    type Entity = ApiKey;

    fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl ApiKeyDao {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_api_key(
        &self,
        user_id: &Uuid,
        name: &str,
        key_hash: &str,
        prefix: &str,
        scope: &[String],
        expires_at: DateTime<FixedOffset>,
    ) -> DaoResult<api_key::Model> {
        let model = api_key::ActiveModel {
            user_id: Set(*user_id),
            name: Set(name.to_string()),
            key_hash: Set(key_hash.to_string()),
            prefix: Set(prefix.to_string()),
            scope: Set(scope.to_vec()),
            is_revoked: Set(false),
            revoked_at: Set(None),
            expires_at: Set(expires_at),
            last_used_at: Set(None),
            last_used_ip: Set(None),
            ..Default::default()
        };
        self.create(model).await
    }

    pub async fn prefix_exists(&self, prefix: &str) -> DaoResult<bool> {
        let count = ApiKey::find()
            .filter(api_key::Column::Prefix.eq(prefix))
            .count(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(count > 0)
    }

    pub async fn find_by_prefix(&self, prefix: &str) -> DaoResult<Option<api_key::Model>> {
        ApiKey::find()
            .filter(api_key::Column::Prefix.eq(prefix))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    /// Fire-and-forget usage stamp; runs in a detached task after validation.
    pub async fn touch_last_used(
        &self,
        api_key_id: &Uuid,
        remote_ip: Option<&str>,
    ) -> DaoResult<()> {
        ApiKey::update_many()
            .col_expr(
                api_key::Column::LastUsedAt,
                Expr::value(Some(Utc::now().fixed_offset())),
            )
            .col_expr(
                api_key::Column::LastUsedIp,
                Expr::value(remote_ip.map(str::to_string)),
            )
            .filter(api_key::Column::ApiKeyId.eq(*api_key_id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(())
    }

    pub async fn revoke(&self, api_key_id: &Uuid, user_id: &Uuid) -> DaoResult<u64> {
        let result = ApiKey::update_many()
            .col_expr(api_key::Column::IsRevoked, Expr::value(true))
            .col_expr(
                api_key::Column::RevokedAt,
                Expr::value(Some(Utc::now().fixed_offset())),
            )
            .filter(api_key::Column::ApiKeyId.eq(*api_key_id))
            .filter(api_key::Column::UserId.eq(*user_id))
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

    use super::{ApiKeyDao, DaoBase};
    use crate::db::entities::api_key;

    fn ts() -> chrono::DateTime<chrono::FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    fn key_model(prefix: &str, user_id: Uuid) -> api_key::Model {
        let now = ts();
        api_key::Model {
            api_key_id: Uuid::new_v4(),
            user_id,
            name: "ci".to_string(),
            key_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
            prefix: prefix.to_string(),
            scope: vec!["read".to_string()],
            is_revoked: false,
            revoked_at: None,
            expires_at: now + Duration::days(90),
            last_used_at: None,
            last_used_ip: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn find_by_prefix_returns_key_when_present() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[key_model("fv9a4f_abc12345", user_id)]])
            .into_connection();
        let dao = ApiKeyDao::new(&db);

        let key = dao
            .find_by_prefix("fv9a4f_abc12345")
            .await
            .expect("query should succeed")
            .expect("key should exist");
        assert_eq!(key.user_id, user_id);
    }

    #[tokio::test]
    async fn touch_last_used_filters_on_key_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let dao = ApiKeyDao::new(&db);

        dao.touch_last_used(&Uuid::new_v4(), Some("203.0.113.9"))
            .await
            .expect("update should succeed");

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("last_used_at") && sql.contains("api_key_id"));
    }
}
