use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::base_traits::{HasCreatedAtColumn, HasIdActiveModel, TimestampedActiveModel};
use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::user::{self, Entity as User};

impl HasCreatedAtColumn for User {
    fn created_at_column() -> user::Column {
        user::Column::CreatedAt
    }
}

impl HasIdActiveModel for user::ActiveModel {
    fn set_id(&mut self, id: Uuid) {
        self.user_id = Set(id);
    }
}

impl TimestampedActiveModel for user::ActiveModel {
    fn set_created_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}

#[derive(Clone)]
pub struct UserDao {
    db: DatabaseConnection,
}

impl DaoBase for UserDao {
    type Entity = User;

    fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl UserDao {
    pub async fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> DaoResult<user::Model> {
        let model = user::ActiveModel {
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            is_verified: Set(false),
            role: Set(crate::auth::Role::User.as_str().to_string()),
            last_login: Set(None),
            version: Set(1),
            ..Default::default()
        };
        self.create(model).await
    }

    pub async fn find_by_email(&self, email: &str) -> DaoResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    pub async fn set_last_login(
        &self,
        user_id: &Uuid,
        last_login: &DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        User::update_many()
            .col_expr(user::Column::LastLogin, Expr::value(Some(*last_login)))
            .filter(user::Column::UserId.eq(*user_id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(())
    }

    /// Flips `is_verified` guarded by the caller-supplied version. Zero rows
    /// affected is the optimistic-concurrency signal.
    pub async fn activate_email(&self, user_id: &Uuid, version: i32) -> DaoResult<u64> {
        let result = User::update_many()
            .col_expr(user::Column::IsVerified, Expr::value(true))
            .col_expr(
                user::Column::Version,
                Expr::col(user::Column::Version).add(1),
            )
            .col_expr(
                user::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(user::Column::UserId.eq(*user_id))
            .filter(user::Column::Version.eq(version))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    /// Rewrites the password hash guarded by the caller-supplied version.
    pub async fn change_password(
        &self,
        user_id: &Uuid,
        version: i32,
        password_hash: &str,
    ) -> DaoResult<u64> {
        let result = User::update_many()
            .col_expr(
                user::Column::PasswordHash,
                Expr::value(password_hash.to_string()),
            )
            .col_expr(
                user::Column::Version,
                Expr::col(user::Column::Version).add(1),
            )
            .col_expr(
                user::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(user::Column::UserId.eq(*user_id))
            .filter(user::Column::Version.eq(version))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }
}
