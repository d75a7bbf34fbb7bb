pub mod action_token;
pub mod jwt;
pub mod password;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Super,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Super => "super",
        }
    }

    /// `super` grants everything; otherwise scopes match exactly.
    pub fn allows(&self, required: Scope) -> bool {
        matches!(self, Scope::Super) || *self == required
    }
}

impl TryFrom<&str> for Scope {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "read" => Ok(Scope::Read),
            "write" => Ok(Scope::Write),
            "super" => Ok(Scope::Super),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

/// The authenticated caller carried through request extensions. An anonymous
/// sentinel stands in for "no user" on optional-auth paths.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub is_activated: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::nil(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role: Role::User,
            is_activated: false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_nil()
    }

    pub fn from_user(user: &crate::db::entities::user::Model) -> Self {
        Self {
            user_id: user.user_id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: Role::try_from(user.role.as_str()).unwrap_or(Role::User),
            is_activated: user.is_verified,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CredentialError {
    ExpiredToken,
    InvalidToken,
    InvalidClaims,
    InvalidCredentials,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            CredentialError::ExpiredToken => "token has expired",
            CredentialError::InvalidToken => "invalid token",
            CredentialError::InvalidClaims => "invalid token claims",
            CredentialError::InvalidCredentials => "invalid credentials",
        };
        write!(f, "{message}")
    }
}

impl std::error::Error for CredentialError {}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::unauthorized(err.to_string())
    }
}
