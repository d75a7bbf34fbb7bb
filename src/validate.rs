use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::auth::{action_token, Scope};
use crate::error::AppError;

const MAX_NAME_LEN: usize = 255;
const MAX_FILENAME_LEN: usize = 255;
const MAX_KEY_NAME_LEN: usize = 100;

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn validate_signup(
    email: &str,
    first_name: &str,
    last_name: &str,
    password: &str,
) -> Result<(), AppError> {
    let mut errors = HashMap::new();

    if !looks_like_email(email) {
        errors.insert("email".to_string(), "must be a valid email address".to_string());
    }
    if first_name.trim().is_empty() {
        errors.insert("first_name".to_string(), "must be provided".to_string());
    } else if first_name.len() > MAX_NAME_LEN {
        errors.insert(
            "first_name".to_string(),
            format!("must not be more than {MAX_NAME_LEN} bytes long"),
        );
    }
    if last_name.trim().is_empty() {
        errors.insert("last_name".to_string(), "must be provided".to_string());
    } else if last_name.len() > MAX_NAME_LEN {
        errors.insert(
            "last_name".to_string(),
            format!("must not be more than {MAX_NAME_LEN} bytes long"),
        );
    }
    if let Err(AppError::Validation(password_errors)) =
        crate::auth::password::check_password_bounds(password)
    {
        errors.extend(password_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(errors))
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<(), AppError> {
    let mut errors = HashMap::new();
    if !looks_like_email(email) {
        errors.insert("email".to_string(), "must be a valid email address".to_string());
    }
    if password.is_empty() {
        errors.insert("password".to_string(), "must be provided".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(errors))
    }
}

pub fn validate_plain_token(token: &str) -> Result<(), AppError> {
    if !action_token::is_well_formed(token) {
        return Err(AppError::field(
            "token",
            format!("must be {} characters long", action_token::PLAINTEXT_LEN),
        ));
    }
    Ok(())
}

pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    let mut errors = HashMap::new();
    if filename.is_empty() {
        errors.insert("filename".to_string(), "must have a filename".to_string());
    }
    if filename.len() > MAX_FILENAME_LEN {
        errors.insert(
            "filename".to_string(),
            format!("must be less than {MAX_FILENAME_LEN} characters"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(errors))
    }
}

pub fn validate_version(version: i32) -> Result<(), AppError> {
    if version <= 0 {
        return Err(AppError::field("version", "must be greater than zero"));
    }
    Ok(())
}

pub fn validate_api_key_request(
    key_name: &str,
    scope: &[String],
    expires_at: Option<DateTime<FixedOffset>>,
) -> Result<Vec<Scope>, AppError> {
    let mut errors = HashMap::new();

    if key_name.trim().is_empty() {
        errors.insert("key_name".to_string(), "must be provided".to_string());
    } else if key_name.len() > MAX_KEY_NAME_LEN {
        errors.insert(
            "key_name".to_string(),
            format!("must not be more than {MAX_KEY_NAME_LEN} bytes long"),
        );
    }

    if scope.is_empty() {
        errors.insert("scope".to_string(), "must contain at least one scope".to_string());
    }

    let mut parsed = Vec::with_capacity(scope.len());
    for value in scope {
        match Scope::try_from(value.as_str()) {
            Ok(scope) => parsed.push(scope),
            Err(()) => {
                errors.insert(
                    "scope".to_string(),
                    format!("'{value}' is not a supported scope"),
                );
            }
        }
    }

    if let Some(expires_at) = expires_at {
        if expires_at <= Utc::now().fixed_offset() {
            errors.insert("expires_at".to_string(), "must be in the future".to_string());
        }
    }

    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(AppError::validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        validate_api_key_request, validate_filename, validate_login, validate_plain_token,
        validate_signup, validate_version,
    };
    use crate::auth::Scope;
    use crate::error::AppError;

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(map) => {
                let mut keys: Vec<String> = map.into_keys().collect();
                keys.sort();
                keys
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn signup_collects_all_failing_fields() {
        let err = validate_signup("not-an-email", "", "", "short").expect_err("should fail");
        assert_eq!(fields(err), vec!["email", "first_name", "last_name", "password"]);
    }

    #[test]
    fn signup_accepts_reasonable_input() {
        assert!(validate_signup("alice@example.com", "Alice", "Example", "supersecret123").is_ok());
    }

    #[test]
    fn login_requires_email_shape_and_password() {
        assert!(validate_login("alice@example.com", "pw").is_ok());
        assert!(validate_login("nope", "pw").is_err());
        assert!(validate_login("alice@example.com", "").is_err());
    }

    #[test]
    fn plain_token_must_be_26_base32_chars() {
        assert!(validate_plain_token(&"A".repeat(26)).is_ok());
        assert!(validate_plain_token("short").is_err());
        assert!(validate_plain_token(&"a".repeat(26)).is_err());
    }

    #[test]
    fn filename_bounds_are_enforced() {
        assert!(validate_filename("doc.txt").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename(&"x".repeat(256)).is_err());
    }

    #[test]
    fn version_must_be_positive() {
        assert!(validate_version(1).is_ok());
        assert!(validate_version(0).is_err());
        assert!(validate_version(-3).is_err());
    }

    #[test]
    fn api_key_request_parses_known_scopes() {
        let scopes = validate_api_key_request(
            "ci",
            &["read".to_string(), "super".to_string()],
            Some(Utc::now().fixed_offset() + Duration::days(30)),
        )
        .expect("request should validate");
        assert_eq!(scopes, vec![Scope::Read, Scope::Super]);
    }

    #[test]
    fn api_key_request_rejects_unknown_scope_and_past_expiry() {
        let err = validate_api_key_request(
            "ci",
            &["admin".to_string()],
            Some(Utc::now().fixed_offset() - Duration::days(1)),
        )
        .expect_err("request should fail");
        assert_eq!(fields(err), vec!["expires_at", "scope"]);
    }
}
