//! Error types for request authentication.
//!
//! [`AuthError`] is what the resolver hands back to the HTTP layer. Its
//! variants are kept distinct for logging, but the HTTP layer collapses every
//! one of them into the same `401` so callers cannot probe which issuers are
//! registered.

use std::time::Duration;

use thiserror::Error;

/// Reasons a request could not be authenticated.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No `Authorization` header, or not a usable `Bearer` credential.
    #[error("missing or malformed bearer credential")]
    MissingCredential,

    /// The token could not be decoded far enough to read its claims.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token payload carries no usable `iss` claim.
    #[error("token has no issuer claim")]
    MissingIssuerClaim,

    /// The claimed issuer does not belong to any registered tenant.
    #[error("issuer is not registered")]
    UnknownIssuer,

    /// The verifier for the issuer could not be built.
    #[error("decoder build failed: {0}")]
    DecoderBuildFailure(#[from] DecoderBuildError),

    /// The token failed signature or claim validation.
    #[error("token validation failed: {0}")]
    TokenValidationFailure(#[from] ValidationFailure),
}

impl AuthError {
    /// Stable, low-cardinality name of the failure kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedToken(_) => "malformed_token",
            Self::MissingIssuerClaim => "missing_issuer_claim",
            Self::UnknownIssuer => "unknown_issuer",
            Self::DecoderBuildFailure(_) => "decoder_build_failure",
            Self::TokenValidationFailure(_) => "token_validation_failure",
        }
    }

    /// Whether a later attempt with the same token could succeed.
    ///
    /// Only discovery failures are transient; everything else is a property
    /// of the token or the registry contents.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DecoderBuildFailure(_))
    }
}

/// Why a verifier could not be built for an issuer.
///
/// Cloneable so a single failed build can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderBuildError {
    /// The registered issuer is not an absolute http(s) URL.
    #[error("invalid issuer URL {0}")]
    InvalidIssuerUrl(String),

    /// Transport-level failure talking to the issuer.
    #[error("request to identity provider failed: {0}")]
    Http(String),

    /// The issuer answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The discovery document or JWKS could not be parsed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The discovery document names a different issuer than the one requested.
    #[error("discovery document issuer {found} does not match {expected}")]
    IssuerMismatch { expected: String, found: String },

    /// The JWKS contained no key the gateway can verify with.
    #[error("no usable signing keys in JWKS")]
    NoUsableKeys,

    /// Discovery did not finish within the configured build timeout.
    #[error("decoder build timed out after {0:?}")]
    Timeout(Duration),

    /// The build task ended without producing a result.
    #[error("decoder build aborted: {0}")]
    Aborted(String),
}

/// Why a token was rejected by an issuer's verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("issuer claim does not match the verifying issuer")]
    IssuerMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("no key matches the token header")]
    NoMatchingKey,

    #[error("audience does not match")]
    InvalidAudience,

    #[error("{0}")]
    Malformed(String),
}
