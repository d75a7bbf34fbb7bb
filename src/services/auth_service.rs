use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::jwt::{encode_token, make_access_claims, JwtKeys, ACCESS_TTL};
use crate::auth::{action_token, password, CredentialError, TokenPurpose};
use crate::db::dao::{ActionTokenDao, DaoBase, RefreshTokenDao, UserDao};
use crate::db::entities::user;
use crate::error::AppError;
use crate::jobs::{EnqueueOptions, JobBroker, EmailPayload, TASK_SEND_EMAIL};
use crate::mailer::{TEMPLATE_PASSWORD_RESET, TEMPLATE_WELCOME};

const VERIFICATION_TTL_HOURS: i64 = 24;
const RESET_TTL_MINUTES: i64 = 15;

#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    user_dao: UserDao,
    refresh_token_dao: RefreshTokenDao,
    action_token_dao: ActionTokenDao,
    jwt: JwtKeys,
    broker: JobBroker,
}

impl AuthService {
    pub fn new(
        user_dao: UserDao,
        refresh_token_dao: RefreshTokenDao,
        action_token_dao: ActionTokenDao,
        jwt: JwtKeys,
        broker: JobBroker,
    ) -> Self {
        Self {
            user_dao,
            refresh_token_dao,
            action_token_dao,
            jwt,
            broker,
        }
    }

    /// Creates the account unverified, issues a 24 h activation token, and
    /// enqueues the welcome email carrying the plaintext.
    pub async fn signup(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        plain_password: &str,
    ) -> Result<user::Model, AppError> {
        if self.user_dao.find_by_email(email).await?.is_some() {
            return Err(AppError::field(
                "email",
                "a user with this email address already exists",
            ));
        }

        let password_hash = password::hash_password(plain_password).await?;
        let user = self
            .user_dao
            .create_user(first_name, last_name, email, &password_hash)
            .await?;

        let (plaintext, hash) = action_token::generate();
        let expires_at = Utc::now().fixed_offset() + chrono::Duration::hours(VERIFICATION_TTL_HOURS);
        self.action_token_dao
            .create_action_token(
                &user.user_id,
                TokenPurpose::EmailVerification,
                &hash,
                expires_at,
            )
            .await?;

        self.enqueue_email(
            &user,
            TEMPLATE_WELCOME,
            HashMap::from([
                (
                    "first_name".to_string(),
                    serde_json::Value::String(user.first_name.clone()),
                ),
                (
                    "activation_token".to_string(),
                    serde_json::Value::String(plaintext),
                ),
            ]),
        );

        Ok(user)
    }

    pub async fn login(&self, email: &str, plain_password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .user_dao
            .find_by_email(email)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        let password_ok = password::verify_password(plain_password, &user.password_hash).await?;
        if !password_ok {
            return Err(CredentialError::InvalidCredentials.into());
        }

        let now = Utc::now().fixed_offset();
        self.user_dao.set_last_login(&user.user_id, &now).await?;

        let claims = make_access_claims(&user, ACCESS_TTL);
        let access_token = encode_token(&self.jwt, &claims)?;
        let refresh = self
            .refresh_token_dao
            .create_refresh_token(&user.user_id, None)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Exchanges a live refresh token for a fresh access token. The user row
    /// is reloaded so the claims carry the role and verification state as of
    /// the exchange, not as of login.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AppError> {
        let token = self
            .refresh_token_dao
            .find_by_token(refresh_token)
            .await?
            .ok_or(CredentialError::InvalidToken)?;

        if token.revoked {
            return Err(CredentialError::InvalidToken.into());
        }
        if token.expires_at < Utc::now().fixed_offset() {
            return Err(CredentialError::ExpiredToken.into());
        }

        let user = self.user_dao.find_by_id(token.user_id).await.map_err(|_| {
            AppError::from(CredentialError::InvalidToken)
        })?;

        let claims = make_access_claims(&user, ACCESS_TTL);
        encode_token(&self.jwt, &claims)
    }

    /// Issues a 15-minute reset token and mails the plaintext; responds
    /// identically whether or not the address exists.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AppError> {
        let Some(user) = self.user_dao.find_by_email(email).await? else {
            return Ok(());
        };

        let (plaintext, hash) = action_token::generate();
        let expires_at = Utc::now().fixed_offset() + chrono::Duration::minutes(RESET_TTL_MINUTES);
        self.action_token_dao
            .create_action_token(&user.user_id, TokenPurpose::PasswordReset, &hash, expires_at)
            .await?;

        self.enqueue_email(
            &user,
            TEMPLATE_PASSWORD_RESET,
            HashMap::from([(
                "reset_token".to_string(),
                serde_json::Value::String(plaintext),
            )]),
        );

        Ok(())
    }

    /// Consumes a reset token: the password rewrite is guarded by the user's
    /// version, so concurrent consumptions succeed at most once.
    pub async fn reset_password(
        &self,
        user_id: &Uuid,
        token_plain: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let hash = action_token::digest(token_plain);
        let token = self
            .action_token_dao
            .find_valid(user_id, TokenPurpose::PasswordReset, &hash)
            .await?
            .ok_or_else(|| AppError::field("token", "invalid or expired reset token"))?;

        let user = self.user_dao.find_by_id(token.user_id).await?;

        let password_hash = password::hash_password(new_password).await?;
        let rows = self
            .user_dao
            .change_password(&user.user_id, user.version, &password_hash)
            .await?;
        if rows == 0 {
            return Err(AppError::edit_conflict());
        }

        self.action_token_dao
            .delete_consumed(&user.user_id, &hash)
            .await?;

        Ok(())
    }

    fn enqueue_email(
        &self,
        user: &user::Model,
        template: &str,
        data: HashMap<String, serde_json::Value>,
    ) {
        let payload = EmailPayload {
            recipient: user.email.clone(),
            user_id: user.user_id,
            template_file: template.to_string(),
            data,
        };
        let opts = EnqueueOptions {
            max_retry: 5,
            timeout: Duration::from_secs(10),
            ..EnqueueOptions::default()
        };
        if let Err(err) = self.broker.enqueue(TASK_SEND_EMAIL, &payload, opts) {
            tracing::error!(error = %err, "failed to enqueue email task");
        }
    }
}
