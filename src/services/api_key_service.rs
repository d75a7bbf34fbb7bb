use chrono::{DateTime, Duration, FixedOffset, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::auth::{CredentialError, Principal, Scope};
use crate::db::dao::{ApiKeyDao, DaoBase, UserDao};
use crate::db::entities::api_key;
use crate::error::AppError;

const PREFIX_RANDOM_LEN: usize = 8;
const SECRET_LEN: usize = 32;
const PREFIX_RETRIES: usize = 5;
const DEFAULT_KEY_TTL_DAYS: i64 = 90;

const ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short deterministic handle derived from the project name, e.g.
/// "filevault" becomes "fi" plus four hex chars of its digest.
pub fn short_project_prefix(project_name: &str) -> String {
    let name = project_name.to_lowercase();
    let sum = Sha256::digest(name.as_bytes());
    let head: String = name.chars().take(2).collect();
    format!("{head}{}", hex::encode(&sum[..2]))
}

fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct ApiKeyService {
    api_key_dao: ApiKeyDao,
    user_dao: UserDao,
    project_prefix: String,
    tracker: TaskTracker,
}

impl ApiKeyService {
    pub fn new(
        api_key_dao: ApiKeyDao,
        user_dao: UserDao,
        project_prefix: String,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            api_key_dao,
            user_dao,
            project_prefix,
            tracker,
        }
    }

    /// Mints a key and returns the full `prefix_secret` string exactly once;
    /// only the bcrypt hash of the secret is stored.
    pub async fn generate(
        &self,
        user_id: &Uuid,
        name: &str,
        expires_at: Option<DateTime<FixedOffset>>,
        scope: &[Scope],
    ) -> Result<(String, api_key::Model), AppError> {
        let mut prefix = String::new();
        for attempt in 0..PREFIX_RETRIES {
            let candidate = format!("{}{}", self.project_prefix, random_string(PREFIX_RANDOM_LEN));
            if !self.api_key_dao.prefix_exists(&candidate).await? {
                prefix = candidate;
                break;
            }
            if attempt == PREFIX_RETRIES - 1 {
                return Err(AppError::internal("failed to generate unique api key prefix"));
            }
        }

        let secret = random_string(SECRET_LEN);
        let key_hash = hash_secret(&secret).await?;

        let expires_at = expires_at
            .unwrap_or_else(|| Utc::now().fixed_offset() + Duration::days(DEFAULT_KEY_TTL_DAYS));
        let scope: Vec<String> = scope.iter().map(|s| s.as_str().to_string()).collect();

        let record = self
            .api_key_dao
            .create_api_key(user_id, name, &key_hash, &prefix, &scope, expires_at)
            .await?;

        let full_key = format!("{}_{}", record.prefix, secret);
        Ok((full_key, record))
    }

    /// Splits on the first underscore, equality-looks-up the prefix, and
    /// bcrypt-compares the secret. The usage stamp is written by a detached
    /// task so it never blocks the request.
    pub async fn validate(
        &self,
        key_string: &str,
        remote_ip: Option<String>,
    ) -> Result<Principal, AppError> {
        let (prefix, secret) = key_string
            .split_once('_')
            .ok_or_else(|| AppError::unauthorized("invalid api key format"))?;

        let record = self
            .api_key_dao
            .find_by_prefix(prefix)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        if record.is_revoked {
            return Err(AppError::unauthorized("api key has been revoked"));
        }
        if record.expires_at < Utc::now().fixed_offset() {
            return Err(AppError::unauthorized("api key has expired"));
        }

        let secret_ok = verify_secret(secret, &record.key_hash).await?;
        if !secret_ok {
            return Err(CredentialError::InvalidCredentials.into());
        }

        let dao = self.api_key_dao.clone();
        let api_key_id = record.api_key_id;
        self.tracker.spawn(async move {
            if let Err(err) = dao.touch_last_used(&api_key_id, remote_ip.as_deref()).await {
                tracing::error!(error = %err, "failed to update api key last_used_at");
            }
        });

        let user = self
            .user_dao
            .find_by_id(record.user_id)
            .await
            .map_err(|_| AppError::from(CredentialError::InvalidCredentials))?;

        Ok(Principal::from_user(&user))
    }

    pub fn scopes_of(record: &api_key::Model) -> Vec<Scope> {
        record
            .scope
            .iter()
            .filter_map(|s| Scope::try_from(s.as_str()).ok())
            .collect()
    }
}

async fn hash_secret(secret: &str) -> Result<String, AppError> {
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, bcrypt::DEFAULT_COST))
        .await
        .map_err(|err| AppError::internal(format!("hashing task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("api key hashing failed: {err}")))
}

async fn verify_secret(secret: &str, hash: &str) -> Result<bool, AppError> {
    let secret = secret.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash))
        .await
        .map_err(|err| AppError::internal(format!("verification task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("api key verification failed: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tokio_util::task::TaskTracker;
    use uuid::Uuid;

    use super::{short_project_prefix, ApiKeyService};
    use crate::db::dao::{ApiKeyDao, DaoBase, UserDao};
    use crate::db::entities::{api_key, user};
    use crate::error::AppError;

    fn user_model(user_id: Uuid) -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            user_id,
            first_name: "Alice".to_string(),
            last_name: "Example".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            is_verified: true,
            role: "user".to_string(),
            last_login: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn key_row(prefix: &str, secret: &str, user_id: Uuid, expired: bool) -> api_key::Model {
        let now = Utc::now().fixed_offset();
        api_key::Model {
            api_key_id: Uuid::new_v4(),
            user_id,
            name: "ci".to_string(),
            key_hash: bcrypt::hash(secret, 4).expect("hash"),
            prefix: prefix.to_string(),
            scope: vec!["read".to_string()],
            is_revoked: false,
            revoked_at: None,
            expires_at: if expired {
                now - Duration::days(1)
            } else {
                now + Duration::days(90)
            },
            last_used_at: None,
            last_used_ip: None,
            created_at: now,
        }
    }

    fn service(db: &sea_orm::DatabaseConnection) -> ApiKeyService {
        ApiKeyService::new(
            ApiKeyDao::new(db),
            UserDao::new(db),
            "fi9a4f".to_string(),
            TaskTracker::new(),
        )
    }

    #[test]
    fn short_project_prefix_is_deterministic_and_short() {
        let a = short_project_prefix("FileVault");
        let b = short_project_prefix("filevault");
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(!a.contains('_'));
    }

    #[tokio::test]
    async fn generate_returns_prefix_underscore_secret_shown_once() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // prefix uniqueness count, then insert returning
            .append_query_results([vec![count_row(0)]])
            .append_query_results([vec![key_row("fi9a4fabc12345", "ignored", user_id, false)]])
            .into_connection();
        let service = service(&db);

        let (full_key, record) = service
            .generate(&user_id, "ci", None, &[crate::auth::Scope::Read])
            .await
            .expect("generate should succeed");

        let (prefix, secret) = full_key.split_once('_').expect("key should split");
        assert_eq!(prefix, record.prefix);
        assert_eq!(secret.len(), 32);
    }

    #[tokio::test]
    async fn validate_rejects_malformed_key() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = service(&db)
            .validate("no-underscore-here", None)
            .await
            .expect_err("validation should fail");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_rejects_unknown_prefix() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<api_key::Model>::new()])
            .into_connection();

        let err = service(&db)
            .validate("fi9a4fabc12345_secret", None)
            .await
            .expect_err("validation should fail");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_rejects_expired_key() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![key_row("fi9a4fabc12345", "s3cr3t", user_id, true)]])
            .into_connection();

        let err = service(&db)
            .validate("fi9a4fabc12345_s3cr3t", None)
            .await
            .expect_err("validation should fail");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_rejects_wrong_secret() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![key_row("fi9a4fabc12345", "rightsecret", user_id, false)]])
            .into_connection();

        let err = service(&db)
            .validate("fi9a4fabc12345_wrongsecret", None)
            .await
            .expect_err("validation should fail");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_returns_principal_for_good_key() {
        let user_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![key_row("fi9a4fabc12345", "s3cr3t", user_id, false)]])
            .append_query_results([vec![user_model(user_id)]])
            .into_connection();

        let principal = service(&db)
            .validate("fi9a4fabc12345_s3cr3t", Some("203.0.113.9".to_string()))
            .await
            .expect("validation should succeed");

        assert_eq!(principal.user_id, user_id);
        assert!(principal.is_activated);
    }

    fn count_row(count: i64) -> std::collections::BTreeMap<String, sea_orm::Value> {
        let mut row = std::collections::BTreeMap::new();
        row.insert("num_items".to_string(), sea_orm::Value::BigInt(Some(count)));
        row
    }
}
