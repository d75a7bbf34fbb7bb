use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{jwt::validate_token, Principal};
use crate::error::AppError;
use crate::state::AppState;

/// Parses `Authorization: <scheme> <credential>`. A missing header attaches
/// the anonymous principal; a malformed header or unknown scheme is rejected
/// outright. Activation is enforced separately by `require_activated`.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(header_value) = req.headers().get(header::AUTHORIZATION) else {
        req.extensions_mut().insert(Principal::anonymous());
        return Ok(next.run(req).await);
    };

    let header_value = header_value.to_str().map_err(|_| {
        AppError::unauthorized("invalid authorization format").into_response()
    })?;

    let mut parts = header_value.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let credential = parts.next().unwrap_or_default();
    if credential.is_empty() {
        return Err(AppError::unauthorized("invalid authorization format").into_response());
    }

    let principal = match scheme {
        "Bearer" => validate_token(state.services.jwt_keys(), credential)
            .map_err(|err| AppError::from(err).into_response())?,
        "ApiKey" => {
            let remote_ip = remote_ip(&req);
            state
                .services
                .api_key()
                .validate(credential, remote_ip)
                .await
                .map_err(IntoResponse::into_response)?
        }
        _ => {
            return Err(
                AppError::unauthorized("unsupported authorization scheme").into_response()
            );
        }
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Rejects anonymous callers as unauthorized and unverified accounts as
/// inactive; everything else passes through untouched.
pub async fn require_activated(req: Request, next: Next) -> Result<Response, Response> {
    let principal = req.extensions().get::<Principal>();

    match principal {
        None => {
            return Err(AppError::unauthorized(
                "authentication is required to access this resource",
            )
            .into_response())
        }
        Some(principal) if principal.is_anonymous() => {
            return Err(AppError::unauthorized(
                "authentication is required to access this resource",
            )
            .into_response())
        }
        Some(principal) if !principal.is_activated => {
            return Err(AppError::inactive_account().into_response())
        }
        Some(_) => {}
    }

    Ok(next.run(req).await)
}

fn remote_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_else(Principal::anonymous))
    }
}
