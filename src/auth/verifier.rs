//! Verifier capability and the claim set it produces.
//!
//! The resolver only ever talks to issuers through these two traits, so a new
//! way of checking tokens (a different key source, a mock in tests) plugs in
//! without touching the resolver or the cache.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::error::{DecoderBuildError, ValidationFailure};
use crate::types::IssuerUrl;

/// Checks tokens for exactly one issuer.
pub trait TokenVerifier: Send + Sync {
    /// The issuer this verifier is anchored to.
    fn issuer(&self) -> &IssuerUrl;

    /// Verify signature and standard claims, returning the validated claims.
    ///
    /// Implementations must reject tokens whose `iss` differs from
    /// [`TokenVerifier::issuer`], whatever the unverified read said.
    fn verify(&self, token: &str) -> Result<ValidatedClaims, ValidationFailure>;
}

/// Future returned by [`VerifierFactory::build`].
pub type BuildFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn TokenVerifier>, DecoderBuildError>> + Send + 'a>>;

/// Builds verifiers for issuers, typically via remote discovery.
pub trait VerifierFactory: Send + Sync {
    fn build<'a>(&'a self, issuer: &'a IssuerUrl) -> BuildFuture<'a>;
}

/// Claims of a token that passed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedClaims {
    /// Issuer (`iss`); equal to the verifying issuer.
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Every other claim, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ValidatedClaims {
    /// Look up a non-registered claim such as `aud`, `scope` or `email`.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Expiry as a timestamp, if the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }
}
