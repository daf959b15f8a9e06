//! Per-request authentication: from an `Authorization` header to a principal.

use std::sync::Arc;

use tracing::debug;

use crate::auth::context::Principal;
use crate::auth::decoder_cache::DecoderCache;
use crate::auth::error::AuthError;
use crate::auth::registry::IssuerRegistry;
use crate::auth::token::UnverifiedToken;

const BEARER_SCHEME: &str = "bearer";

/// Strip the `Bearer` scheme from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. An absent header, another scheme
/// or an empty token are all [`AuthError::MissingCredential`].
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = authorization.ok_or(AuthError::MissingCredential)?;
    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthError::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::MissingCredential);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

/// Ties the registry and the decoder cache together for each request.
///
/// The unverified `iss` claim only selects which verifier to use. Nothing is
/// fetched for issuers that no tenant has registered, and the chosen
/// verifier re-checks `iss` against its own issuer.
#[derive(Clone)]
pub struct AuthResolver {
    registry: Arc<IssuerRegistry>,
    decoders: Arc<DecoderCache>,
}

impl AuthResolver {
    pub fn new(registry: Arc<IssuerRegistry>, decoders: Arc<DecoderCache>) -> Self {
        Self { registry, decoders }
    }

    pub fn registry(&self) -> &Arc<IssuerRegistry> {
        &self.registry
    }

    pub fn decoders(&self) -> &Arc<DecoderCache> {
        &self.decoders
    }

    /// Authenticate a request from its `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization)?;
        self.authenticate_token(token).await
    }

    /// Authenticate a raw bearer token.
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, AuthError> {
        let unverified = UnverifiedToken::parse(token)?;
        let claimed = unverified.issuer()?;

        let issuer = self.registry.resolve_issuer(claimed).inspect_err(|_| {
            debug!(claimed_issuer = %claimed, "Token names an unregistered issuer");
        })?;

        let verifier = self.decoders.get_or_build(&issuer).await?;
        let claims = verifier.verify(token)?;

        debug!(issuer = %issuer, subject = ?claims.sub, "Token verified");
        Ok(Principal::new(issuer, claims))
    }
}
