//! Multi-tenant bearer-token authentication.
//!
//! Each tenant's tokens are signed by its own identity provider. A request is
//! authenticated in these steps:
//!
//! - **Bearer extraction**: take the token from the `Authorization` header
//! - **Issuer read**: decode the unverified payload far enough to read `iss`
//! - **Registry check**: the claimed issuer must belong to a registered tenant
//! - **Verifier lookup**: fetch or lazily build the issuer's verifier,
//!   with at most one discovery in flight per issuer
//! - **Verification**: signature and standard claims, including `iss` again
//!
//! ## Usage
//!
//! ```ignore
//! let registry = Arc::new(IssuerRegistry::new());
//! registry.register(TenantId::new("acme"), IssuerUrl::new("https://issuer.acme.example"));
//!
//! let factory = Arc::new(OidcVerifierFactory::new(VerifierOptions::default())?);
//! let decoders = Arc::new(DecoderCache::new(factory, Duration::from_secs(10)));
//! let resolver = AuthResolver::new(registry, decoders);
//!
//! let principal = resolver.authenticate(Some("Bearer eyJ...")).await?;
//! ```

mod context;
mod decoder_cache;
mod error;
pub mod jwks;
mod registry;
mod resolver;
mod token;
mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

pub use context::Principal;
pub use decoder_cache::{DEFAULT_BUILD_TIMEOUT_SECONDS, DecoderCache, DecoderState};
pub use error::{AuthError, DecoderBuildError, ValidationFailure};
pub use jwks::{JwksVerifier, OidcVerifierFactory, VerifierOptions};
pub use registry::IssuerRegistry;
pub use resolver::{AuthResolver, bearer_token};
pub use token::{UnverifiedToken, extract_issuer};
pub use verifier::{BuildFuture, TokenVerifier, ValidatedClaims, VerifierFactory};
