use std::collections::HashMap;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Validation(HashMap<String, String>),
    Unauthorized(String),
    InactiveAccount(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooLarge(String),
    DuplicateUpload(String),
    RateLimited(String),
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn validation(errors: HashMap<String, String>) -> Self {
        Self::Validation(errors)
    }

    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(name.to_string(), message.into());
        Self::Validation(errors)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn inactive_account() -> Self {
        Self::InactiveAccount(
            "your user account must be activated to access this resource".to_string(),
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn edit_conflict() -> Self {
        Self::Conflict(
            "unable to update the record due to an edit conflict, please try again".to_string(),
        )
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge(message.into())
    }

    pub fn duplicate_upload() -> Self {
        Self::DuplicateUpload("an identical file already exists for this account".to_string())
    }

    pub fn rate_limited() -> Self {
        Self::RateLimited("rate limit exceeded".to_string())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn message(&self) -> String {
        match self {
            Self::BadRequest(message)
            | Self::Unauthorized(message)
            | Self::InactiveAccount(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::TooLarge(message)
            | Self::DuplicateUpload(message)
            | Self::RateLimited(message)
            | Self::Internal(message) => message.clone(),
            Self::Validation(errors) => {
                let mut fields: Vec<&str> = errors.keys().map(String::as_str).collect();
                fields.sort_unstable();
                format!("validation failed: {}", fields.join(", "))
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        // Driver detail stays server-side; callers see a generic failure.
        tracing::error!(error = %err, "database error");
        AppError::internal("a server error occurred while processing the request")
    }
}

impl From<crate::db::dao::DaoLayerError> for AppError {
    fn from(err: crate::db::dao::DaoLayerError) -> Self {
        use crate::db::dao::DaoLayerError;
        match err {
            DaoLayerError::NotFound { entity, .. } => {
                AppError::not_found(format!("{entity} does not exist"))
            }
            DaoLayerError::InvalidPagination { .. } => AppError::bad_request(err.to_string()),
            DaoLayerError::Db(inner) => AppError::from(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn field_builds_single_entry_validation_error() {
        let err = AppError::field("token", "invalid or expired activation token");
        match err {
            AppError::Validation(map) => {
                assert_eq!(
                    map.get("token").map(String::as_str),
                    Some("invalid or expired activation token")
                );
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn validation_message_lists_failing_fields() {
        let mut map = std::collections::HashMap::new();
        map.insert("page".to_string(), "must be greater than zero".to_string());
        map.insert(
            "page_size".to_string(),
            "must be a maximum of 100".to_string(),
        );

        let message = AppError::Validation(map).message();

        assert_eq!(message, "validation failed: page, page_size");
    }
}
