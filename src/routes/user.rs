use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::json;

use super::auth::UserResponse;
use crate::auth::Principal;
use crate::error::AppError;
use crate::middleware::{authenticate, require_activated};
use crate::state::AppState;
use crate::validate;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let activated_only = Router::new()
        .route("/me", get(my_profile))
        .route("/api-keys", post(create_api_key))
        .route_layer(from_fn(require_activated));

    Router::new()
        .route("/activated", put(activate))
        .merge(activated_only)
        .route_layer(from_fn_with_state(state, authenticate))
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    token: String,
}

async fn activate(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<ActivateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if principal.is_anonymous() {
        return Err(AppError::unauthorized(
            "authentication is required to access this resource",
        ));
    }
    validate::validate_plain_token(&body.token)?;

    let user = state
        .services
        .user()
        .activate(&principal.user_id, &body.token)
        .await?;

    Ok(Json(json!({ "user": UserResponse::from(user) })))
}

async fn my_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let user = state.services.user().get_user(&principal.user_id).await?;
    Ok(Json(json!({ "user": UserResponse::from(user) })))
}

#[derive(Debug, Deserialize)]
struct CreateApiKeyRequest {
    key_name: String,
    expires_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    scope: Vec<String>,
}

async fn create_api_key(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let scope = validate::validate_api_key_request(&body.key_name, &body.scope, body.expires_at)?;

    let (full_key, _record) = state
        .services
        .api_key()
        .generate(&principal.user_id, &body.key_name, body.expires_at, &scope)
        .await?;

    // The full key is shown exactly once; only its hash survives server-side.
    Ok((StatusCode::CREATED, Json(json!({ "apiKey": full_key }))))
}
