use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 8;
// bcrypt truncates input beyond 72 bytes; reject instead of silently hashing a prefix.
const MAX_PASSWORD_LEN: usize = 72;

pub fn check_password_bounds(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::field(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} bytes long"),
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::field(
            "password",
            format!("must not exceed {MAX_PASSWORD_LEN} bytes"),
        ));
    }
    Ok(())
}

/// bcrypt is CPU-bound (~100 ms per call); both directions run on the
/// blocking pool so worker threads stay free.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    check_password_bounds(password)?;

    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|err| AppError::internal(format!("hashing task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("password hashing failed: {err}")))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| AppError::internal(format!("verification task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("password verification failed: {err}")))
}
