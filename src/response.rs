use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        log_app_error(&self, status);

        let body = match &self {
            AppError::Validation(errors) => json!({ "error": errors }),
            other => json!({ "error": other.message() }),
        };

        (status, Json(body)).into_response()
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::InactiveAccount(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) | AppError::DuplicateUpload(_) => StatusCode::CONFLICT,
        AppError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn log_app_error(err: &AppError, status: StatusCode) {
    let kind = error_kind(err);
    let message = err.message();

    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error_kind = %kind, message = %message);
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        tracing::debug!(status = status.as_u16(), error_kind = %kind, message = %message);
    } else {
        tracing::warn!(status = status.as_u16(), error_kind = %kind, message = %message);
    }
}

fn error_kind(err: &AppError) -> &'static str {
    match err {
        AppError::BadRequest(_) => "bad_request",
        AppError::Validation(_) => "validation_failed",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::InactiveAccount(_) => "inactive_account",
        AppError::Forbidden(_) => "forbidden",
        AppError::NotFound(_) => "not_found",
        AppError::Conflict(_) => "conflict",
        AppError::TooLarge(_) => "too_large",
        AppError::DuplicateUpload(_) => "duplicate_upload",
        AppError::RateLimited(_) => "rate_limited",
        AppError::Internal(_) => "internal",
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::status_for;
    use crate::error::AppError;

    #[test]
    fn status_mapping_matches_error_kinds() {
        assert_eq!(status_for(&AppError::bad_request("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AppError::field("file", "missing")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&AppError::unauthorized("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AppError::inactive_account()), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AppError::forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AppError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AppError::edit_conflict()), StatusCode::CONFLICT);
        assert_eq!(status_for(&AppError::duplicate_upload()), StatusCode::CONFLICT);
        assert_eq!(status_for(&AppError::too_large("x")), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_for(&AppError::rate_limited()), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_for(&AppError::internal("x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
