use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CredentialError, Principal, Role};
use crate::error::AppError;

pub const ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct JwtKeys {
    pub enc: EncodingKey,
    pub dec: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            enc: EncodingKey::from_secret(secret),
            dec: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub is_verified: bool,
    pub iat: usize,
    pub exp: usize,
}

pub fn now_unix() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

pub fn make_access_claims(user: &crate::db::entities::user::Model, ttl: Duration) -> Claims {
    let iat = now_unix();
    Claims {
        sub: user.user_id.to_string(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        is_verified: user.is_verified,
        iat,
        exp: iat + ttl.as_secs() as usize,
    }
}

pub fn encode_token(keys: &JwtKeys, claims: &Claims) -> Result<String, AppError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".into());

    encode(&header, claims, &keys.enc)
        .map_err(|err| AppError::internal(format!("token encoding failed: {err}")))
}

/// Validates the signature and expiry, then lifts the claims into a
/// fully-populated principal. Only HS256 is accepted; a token signed with any
/// other algorithm fails as `InvalidToken`.
pub fn validate_token(keys: &JwtKeys, token: &str) -> Result<Principal, CredentialError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = jsonwebtoken::decode::<serde_json::Value>(token, &keys.dec, &validation).map_err(
        |err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => CredentialError::ExpiredToken,
            _ => CredentialError::InvalidToken,
        },
    )?;

    principal_from_claims(&data.claims)
}

fn principal_from_claims(claims: &serde_json::Value) -> Result<Principal, CredentialError> {
    let get_str = |key: &str| -> Result<&str, CredentialError> {
        claims
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or(CredentialError::InvalidClaims)
    };

    let user_id =
        Uuid::parse_str(get_str("sub")?).map_err(|_| CredentialError::InvalidClaims)?;
    let role =
        Role::try_from(get_str("role")?).map_err(|_| CredentialError::InvalidClaims)?;
    let is_activated = claims
        .get("is_verified")
        .and_then(serde_json::Value::as_bool)
        .ok_or(CredentialError::InvalidClaims)?;

    Ok(Principal {
        user_id,
        first_name: get_str("first_name")?.to_string(),
        last_name: get_str("last_name")?.to_string(),
        email: get_str("email")?.to_string(),
        role,
        is_activated,
    })
}
