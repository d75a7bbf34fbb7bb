use axum::{
    body::to_bytes,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::response::log_app_error;

const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// Normalizes framework-generated error responses (rejections, 404s from the
/// router) into the `{"error": …}` envelope the API promises.
pub async fn json_error_middleware(req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    // Anything already JSON came from our own error type; pass it through.
    if content_type(&response).is_some_and(|ct| ct.contains("json")) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let message = error_message(status, to_bytes(body, MAX_ERROR_BODY_BYTES).await.ok());
    let app_error = app_error_from_status(status, message);
    if status.is_server_error() {
        log_app_error(&app_error, status);
    }

    let (mut new_parts, new_body) = app_error.into_response().into_parts();
    for (name, value) in &parts.headers {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            new_parts.headers.insert(name.clone(), value.clone());
        }
    }
    Response::from_parts(new_parts, new_body)
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
}

/// Prefers the plain-text body the framework produced, falling back to the
/// canonical status reason when the body is empty or unreadable.
fn error_message(status: StatusCode, body: Option<axum::body::Bytes>) -> String {
    body.map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

fn app_error_from_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::bad_request(message)
        }
        StatusCode::UNAUTHORIZED => AppError::unauthorized(message),
        StatusCode::FORBIDDEN => AppError::forbidden(message),
        StatusCode::NOT_FOUND => AppError::not_found(message),
        StatusCode::CONFLICT => AppError::conflict(message),
        StatusCode::PAYLOAD_TOO_LARGE => AppError::too_large(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::rate_limited(),
        _ if status.is_client_error() => AppError::bad_request(message),
        _ => AppError::internal(message),
    }
}
