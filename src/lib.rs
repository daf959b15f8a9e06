// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod types;

// Re-export key types and functions
pub use api::{GatewayState, create_admin_router, create_public_router};
pub use auth::{
    AuthError, AuthResolver, DecoderCache, IssuerRegistry, OidcVerifierFactory, Principal,
};
pub use config::{SecurityConfig, TenantMode, load_security_config};
pub use types::{IssuerUrl, TenantId};

use std::sync::Arc;
use anyhow::Result;

/// Convenience function to wire a gateway from its security configuration.
///
/// Seeds the issuer registry from the configured tenants and backs the
/// decoder cache with OIDC discovery.
pub fn create_gateway(config: &SecurityConfig, admin_token: Option<String>) -> Result<GatewayState> {
    let registry = Arc::new(IssuerRegistry::new());
    registry.initialize_with_static(config.issuers.clone());

    let factory = Arc::new(OidcVerifierFactory::new(config.verifier_options())?);
    let decoders = Arc::new(DecoderCache::new(factory, config.build_timeout()));

    let resolver = AuthResolver::new(registry, decoders);
    Ok(GatewayState::new(resolver, config.mode, admin_token))
}
