//! Request guards for the public and admin routers.

use axum::{
    extract::{FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use http::{HeaderMap, StatusCode, header, request::Parts};
use serde_json::json;
use tracing::{error, warn};

use super::GatewayState;
use crate::auth::{AuthError, Principal, bearer_token};

/// Uniform rejection for every authentication failure.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": "unauthenticated" })),
    )
        .into_response()
}

fn authorization_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn log_rejection(err: &AuthError, path: &str) {
    match err {
        AuthError::DecoderBuildFailure(e) => {
            error!(kind = err.kind(), path = %path, error = %e, "Rejected request: issuer verifier unavailable");
        }
        _ => {
            warn!(kind = err.kind(), path = %path, error = %err, "Rejected request");
        }
    }
}

/// Authenticate the bearer token and attach the [`Principal`] to the request.
pub async fn require_bearer(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = authorization_header(request.headers());

    match state.resolver.authenticate(authorization.as_deref()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            log_rejection(&e, request.uri().path());
            unauthorized()
        }
    }
}

/// Require the configured admin token, if any, on admin routes.
pub async fn require_admin_token(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(request).await;
    };

    let authorization = authorization_header(request.headers());
    match bearer_token(authorization.as_deref()) {
        Ok(token) if token == expected => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected admin request: bad or missing admin token");
            unauthorized()
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            error!("Principal missing from request, bearer middleware not installed");
            unauthorized()
        })
    }
}
