mod auth;
mod files;
mod health;
mod user;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::middleware::rate_limit::rate_limit;
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .nest("/auth", auth::router())
        .nest("/user", user::router(Arc::clone(&state)))
        .nest("/files", files::router(Arc::clone(&state)));

    // Layer order: the rate limiter is outermost, CORS next, per-area auth
    // middleware lives inside the nested routers.
    Router::new()
        .nest(API_PREFIX, api)
        .layer(cors_layer(&state))
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    use axum::http::{header, Method};

    let origin = state.config.general.domain.clone();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(300));

    match origin.parse() {
        Ok(origin) => layer.allow_origin([origin]),
        Err(_) => layer,
    }
}
