use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::entities::user;
use crate::error::AppError;
use crate::state::AppState;
use crate::validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route(
            "/password-reset",
            post(request_password_reset).put(confirm_password_reset),
        )
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    email: String,
    first_name: String,
    last_name: String,
    password: String,
}

/// Public projection of a user row; the password hash never leaves the
/// service.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub role: String,
    pub last_login: Option<DateTime<FixedOffset>>,
    pub version: i32,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_verified: user.is_verified,
            role: user.role,
            last_login: user.last_login,
            version: user.version,
        }
    }
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_signup(&body.email, &body.first_name, &body.last_name, &body.password)?;

    let user = state
        .services
        .auth()
        .signup(&body.email, &body.first_name, &body.last_name, &body.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserResponse::from(user) })),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_login(&body.email, &body.password)?;

    let tokens = state.services.auth().login(&body.email, &body.password).await?;

    Ok(Json(json!({
        "tokens": {
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::field("refresh_token", "must be provided"));
    }

    let access_token = state.services.auth().refresh(&body.refresh_token).await?;

    Ok(Json(json!({ "access_token": access_token })))
}

#[derive(Debug, Deserialize)]
struct PasswordResetRequest {
    email: String,
}

async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !body.email.contains('@') {
        return Err(AppError::field("email", "must be a valid email address"));
    }

    state.services.auth().send_password_reset(&body.email).await?;

    Ok(Json(json!({ "message": "Check your email for a reset link" })))
}

#[derive(Debug, Deserialize)]
struct ConfirmPasswordResetRequest {
    token: String,
    user_id: Uuid,
    password: String,
}

async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConfirmPasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_plain_token(&body.token)?;

    state
        .services
        .auth()
        .reset_password(&body.user_id, &body.token, &body.password)
        .await?;

    Ok(Json(json!({ "message": "Password successfully changed" })))
}
