//! Authenticated principal for request-scoped identity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::verifier::ValidatedClaims;
use crate::types::IssuerUrl;

/// Identity attached to a request once its bearer token has been verified.
///
/// Immutable once created; handlers read it through the getters.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Issuer whose verifier accepted the token
    issuer: IssuerUrl,
    /// Validated claims, including any non-registered ones
    claims: ValidatedClaims,
}

impl Principal {
    pub fn new(issuer: IssuerUrl, claims: ValidatedClaims) -> Self {
        Self { issuer, claims }
    }

    pub fn issuer(&self) -> &IssuerUrl {
        &self.issuer
    }

    /// Get the `sub` claim if present.
    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }

    pub fn claims(&self) -> &ValidatedClaims {
        &self.claims
    }

    /// Look up an additional claim such as `email` or `scope`.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.claim(key)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }

    /// Get a display-friendly name for this principal.
    pub fn display(&self) -> String {
        if let Some(name) = self.claim("name").and_then(Value::as_str) {
            name.to_string()
        } else if let Some(email) = self.claim("email").and_then(Value::as_str) {
            email.to_string()
        } else if let Some(sub) = self.subject() {
            sub.to_string()
        } else {
            format!("anonymous@{}", self.issuer)
        }
    }
}
