// HTTP surface of the gateway: public API and tenant admin API

pub mod middleware;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{AuthResolver, DecoderState, Principal};
use crate::config::TenantMode;
use crate::types::{IssuerUrl, TenantId};

/// State shared by the public and admin routers.
#[derive(Clone)]
pub struct GatewayState {
    pub resolver: AuthResolver,
    pub mode: TenantMode,
    /// Bearer token required on `/admin/*` when set
    pub admin_token: Option<Arc<str>>,
}

impl GatewayState {
    pub fn new(resolver: AuthResolver, mode: TenantMode, admin_token: Option<String>) -> Self {
        Self {
            resolver,
            mode,
            admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

pub fn create_public_router(state: GatewayState) -> Router {
    let api = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub fn create_admin_router(state: GatewayState) -> Router {
    Router::new()
        .route("/admin/tenants/register", post(register_tenant))
        .route("/admin/tenants", get(list_tenants))
        .route("/admin/decoders", get(list_decoders).delete(evict_decoder))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_admin_token,
        ))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<GatewayState>) -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "tenants": state.resolver.registry().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Claims of the authenticated caller.
async fn me(principal: Principal) -> Json<Value> {
    Json(serde_json::json!({
        "issuer": principal.issuer(),
        "subject": principal.subject(),
        "claims": principal.claims(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterTenantParams {
    tenant_id: Option<String>,
    issuer_url: Option<String>,
}

async fn register_tenant(
    State(state): State<GatewayState>,
    Query(params): Query<RegisterTenantParams>,
) -> Result<String, (StatusCode, String)> {
    if !state.mode.allows_registration() {
        warn!("Refused runtime tenant registration in static mode");
        return Err((
            StatusCode::FORBIDDEN,
            "Runtime tenant registration is disabled in static mode".to_string(),
        ));
    }

    let tenant_id = non_empty(params.tenant_id).ok_or((
        StatusCode::BAD_REQUEST,
        "Missing required parameter: tenantId".to_string(),
    ))?;
    let issuer_url = non_empty(params.issuer_url).ok_or((
        StatusCode::BAD_REQUEST,
        "Missing required parameter: issuerUrl".to_string(),
    ))?;

    let tenant_id = TenantId::new(tenant_id);
    state
        .resolver
        .registry()
        .register(tenant_id.clone(), IssuerUrl::new(issuer_url));

    Ok(format!("Tenant registered: {tenant_id}"))
}

async fn list_tenants(State(state): State<GatewayState>) -> Json<BTreeMap<TenantId, IssuerUrl>> {
    Json(state.resolver.registry().all_issuers())
}

async fn list_decoders(
    State(state): State<GatewayState>,
) -> Json<BTreeMap<IssuerUrl, DecoderState>> {
    Json(state.resolver.decoders().cached_issuers())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvictDecoderParams {
    issuer_url: Option<String>,
}

async fn evict_decoder(
    State(state): State<GatewayState>,
    Query(params): Query<EvictDecoderParams>,
) -> StatusCode {
    let Some(issuer_url) = non_empty(params.issuer_url) else {
        return StatusCode::BAD_REQUEST;
    };

    let issuer = IssuerUrl::new(issuer_url);
    if state.resolver.decoders().invalidate(&issuer) {
        info!(issuer = %issuer, "Verifier evicted by operator");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
