use uuid::Uuid;

use crate::auth::{action_token, TokenPurpose};
use crate::db::dao::{ActionTokenDao, DaoBase, DaoLayerError, UserDao};
use crate::db::entities::user;
use crate::error::AppError;

#[derive(Clone)]
pub struct UserService {
    user_dao: UserDao,
    action_token_dao: ActionTokenDao,
}

impl UserService {
    pub fn new(user_dao: UserDao, action_token_dao: ActionTokenDao) -> Self {
        Self {
            user_dao,
            action_token_dao,
        }
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Result<user::Model, AppError> {
        match self.user_dao.find_by_id(*user_id).await {
            Ok(model) => Ok(model),
            Err(DaoLayerError::NotFound { .. }) => Err(AppError::not_found("user does not exist")),
            Err(err) => Err(err.into()),
        }
    }

    /// Consumes an email-verification token and flips `is_verified` under the
    /// user's version. The token row is removed afterwards, making the
    /// plaintext single-use.
    pub async fn activate(&self, user_id: &Uuid, token_plain: &str) -> Result<user::Model, AppError> {
        let hash = action_token::digest(token_plain);
        let token = self
            .action_token_dao
            .find_valid(user_id, TokenPurpose::EmailVerification, &hash)
            .await?
            .ok_or_else(|| AppError::field("token", "invalid or expired activation token"))?;

        let user = self.get_user(&token.user_id).await?;

        let rows = self
            .user_dao
            .activate_email(&user.user_id, user.version)
            .await?;
        if rows == 0 {
            return Err(AppError::edit_conflict());
        }

        self.action_token_dao
            .delete_consumed(&user.user_id, &hash)
            .await?;

        self.get_user(&user.user_id).await
    }
}
