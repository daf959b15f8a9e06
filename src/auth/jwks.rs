//! OIDC discovery and JWKS-backed token verification.
//!
//! An issuer's verifier is built by fetching its discovery document, then the
//! JSON Web Key Set it points at, and turning every usable signing key into a
//! `jsonwebtoken` decoding key. The resulting [`JwksVerifier`] is immutable;
//! picking up rotated keys means building a new one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::auth::error::{DecoderBuildError, ValidationFailure};
use crate::auth::verifier::{BuildFuture, TokenVerifier, ValidatedClaims, VerifierFactory};
use crate::types::IssuerUrl;

/// Default clock skew tolerated on `exp` / `nbf`, in seconds.
pub const DEFAULT_LEEWAY_SECONDS: u64 = 60;

/// Default per-request timeout for discovery and JWKS fetches, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "OKP")
    pub kty: String,
    /// Key ID, matched against the JWT header `kid`
    pub kid: Option<String>,
    /// Algorithm the key is restricted to
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    /// Curve for EC / OKP keys
    pub crv: Option<String>,
    /// EC x coordinate, or the OKP public key
    pub x: Option<String>,
    /// EC y coordinate
    pub y: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// The parts of an OIDC / RFC 8414 metadata document the gateway needs.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

/// Claim-check settings shared by every verifier the gateway builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierOptions {
    /// Clock skew tolerated on `exp` and `nbf`.
    pub leeway_seconds: u64,
    /// When set, tokens must list this value in `aud`.
    pub audience: Option<String>,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
            audience: None,
        }
    }
}

struct VerificationKey {
    kid: Option<String>,
    algorithms: Vec<Algorithm>,
    key: DecodingKey,
}

/// Verifies tokens for one issuer against that issuer's published keys.
pub struct JwksVerifier {
    issuer: IssuerUrl,
    keys: Vec<VerificationKey>,
    options: VerifierOptions,
}

impl fmt::Debug for JwksVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksVerifier")
            .field("issuer", &self.issuer)
            .field("keys", &self.keys.len())
            .field("options", &self.options)
            .finish()
    }
}

impl JwksVerifier {
    /// Build a verifier from an already fetched key set.
    ///
    /// Encryption keys and keys the gateway cannot use are skipped; a set
    /// with nothing left fails with [`DecoderBuildError::NoUsableKeys`].
    pub fn from_jwks(
        issuer: IssuerUrl,
        jwks: &JwksDocument,
        options: VerifierOptions,
    ) -> Result<Self, DecoderBuildError> {
        let mut keys = Vec::with_capacity(jwks.keys.len());

        for jwk in &jwks.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                debug!(kid = ?jwk.kid, "Skipping encryption key");
                continue;
            }

            match verification_key(jwk) {
                Ok(key) => keys.push(key),
                Err(reason) => debug!(kid = ?jwk.kid, %reason, "Skipping unusable JWK"),
            }
        }

        if keys.is_empty() {
            return Err(DecoderBuildError::NoUsableKeys);
        }

        Ok(Self {
            issuer,
            keys,
            options,
        })
    }

    /// Number of keys this verifier will try.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.options.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        match &self.options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

impl TokenVerifier for JwksVerifier {
    fn issuer(&self) -> &IssuerUrl {
        &self.issuer
    }

    fn verify(&self, token: &str) -> Result<ValidatedClaims, ValidationFailure> {
        let header = decode_header(token)
            .map_err(|e| ValidationFailure::Malformed(format!("invalid JWT header: {e}")))?;

        let compatible: Vec<&VerificationKey> = self
            .keys
            .iter()
            .filter(|k| k.algorithms.contains(&header.alg))
            .collect();
        if compatible.is_empty() {
            return Err(ValidationFailure::UnsupportedAlgorithm);
        }

        // A kid pins the key; without one every compatible key is a candidate.
        let candidates: Vec<&VerificationKey> = match header.kid.as_deref() {
            Some(kid) => compatible
                .into_iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .collect(),
            None => compatible,
        };
        if candidates.is_empty() {
            return Err(ValidationFailure::NoMatchingKey);
        }

        let validation = self.validation(header.alg);
        for candidate in candidates {
            match decode::<ValidatedClaims>(token, &candidate.key, &validation) {
                Ok(data) => return Ok(data.claims),
                // Claims are only checked after the signature, so anything
                // else is final for this token.
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) => return Err(validation_failure(&e)),
            }
        }

        Err(ValidationFailure::InvalidSignature)
    }
}

fn verification_key(jwk: &Jwk) -> Result<VerificationKey, String> {
    let (key, family) = match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or("missing 'n' in RSA key")?;
            let e = jwk.e.as_deref().ok_or("missing 'e' in RSA key")?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| format!("invalid RSA components: {e}"))?;
            (key, RSA_ALGORITHMS.to_vec())
        }
        "EC" => {
            let alg = match jwk.crv.as_deref() {
                Some("P-256") => Algorithm::ES256,
                Some("P-384") => Algorithm::ES384,
                other => return Err(format!("unsupported EC curve {other:?}")),
            };
            let x = jwk.x.as_deref().ok_or("missing 'x' in EC key")?;
            let y = jwk.y.as_deref().ok_or("missing 'y' in EC key")?;
            let key = DecodingKey::from_ec_components(x, y)
                .map_err(|e| format!("invalid EC components: {e}"))?;
            (key, vec![alg])
        }
        "OKP" => {
            if jwk.crv.as_deref() != Some("Ed25519") {
                return Err(format!("unsupported OKP curve {:?}", jwk.crv));
            }
            let x = jwk.x.as_deref().ok_or("missing 'x' in OKP key")?;
            let key = DecodingKey::from_ed_components(x)
                .map_err(|e| format!("invalid Ed25519 key: {e}"))?;
            (key, vec![Algorithm::EdDSA])
        }
        other => return Err(format!("unsupported key type {other}")),
    };

    let algorithms = match jwk.alg.as_deref() {
        Some(alg) => {
            let alg = Algorithm::from_str(alg).map_err(|_| format!("unknown algorithm {alg}"))?;
            if !family.contains(&alg) {
                return Err(format!("algorithm {alg:?} does not fit key type {}", jwk.kty));
            }
            vec![alg]
        }
        None => family,
    };

    Ok(VerificationKey {
        kid: jwk.kid.clone(),
        algorithms,
        key,
    })
}

fn validation_failure(err: &jsonwebtoken::errors::Error) -> ValidationFailure {
    match err.kind() {
        ErrorKind::ExpiredSignature => ValidationFailure::Expired,
        ErrorKind::ImmatureSignature => ValidationFailure::NotYetValid,
        ErrorKind::InvalidIssuer => ValidationFailure::IssuerMismatch,
        ErrorKind::InvalidSignature => ValidationFailure::InvalidSignature,
        ErrorKind::InvalidAudience => ValidationFailure::InvalidAudience,
        ErrorKind::InvalidAlgorithm => ValidationFailure::UnsupportedAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) => {
            ValidationFailure::Malformed(format!("missing required claim: {claim}"))
        }
        _ => ValidationFailure::Malformed(err.to_string()),
    }
}

/// Metadata URLs to try for an issuer, most specific first.
///
/// Follows OIDC Discovery (`{issuer}/.well-known/openid-configuration`) and
/// then the RFC 8414 forms that insert the well-known segment before the
/// issuer's path.
pub fn discovery_urls(issuer: &str) -> Result<Vec<String>, DecoderBuildError> {
    let url = Url::parse(issuer).map_err(|_| DecoderBuildError::InvalidIssuerUrl(issuer.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(DecoderBuildError::InvalidIssuerUrl(issuer.to_string()));
    }

    let origin = url.origin().ascii_serialization();
    let path = url.path().trim_end_matches('/');
    let base = issuer.trim_end_matches('/');

    let mut urls = vec![format!("{base}/.well-known/openid-configuration")];
    if path.is_empty() {
        urls.push(format!("{origin}/.well-known/oauth-authorization-server"));
    } else {
        urls.push(format!("{origin}/.well-known/openid-configuration{path}"));
        urls.push(format!("{origin}/.well-known/oauth-authorization-server{path}"));
    }
    Ok(urls)
}

/// Builds [`JwksVerifier`]s by discovering issuers over HTTP.
pub struct OidcVerifierFactory {
    client: reqwest::Client,
    options: VerifierOptions,
}

impl OidcVerifierFactory {
    /// Create a factory with its own HTTP client.
    pub fn new(options: VerifierOptions) -> Result<Self, DecoderBuildError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| DecoderBuildError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, options))
    }

    /// Create a factory that reuses an existing HTTP client.
    pub fn with_client(client: reqwest::Client, options: VerifierOptions) -> Self {
        Self { client, options }
    }

    /// Fetch the issuer's metadata document.
    ///
    /// The document must name exactly the requested issuer; a provider that
    /// answers for a different issuer is not trusted for this one.
    pub async fn discover(&self, issuer: &IssuerUrl) -> Result<DiscoveryDocument, DecoderBuildError> {
        let mut first_error = None;

        for url in discovery_urls(issuer.as_str())? {
            match self.fetch_json::<DiscoveryDocument>(&url).await {
                Ok(document) => {
                    if document.issuer != issuer.as_str() {
                        return Err(DecoderBuildError::IssuerMismatch {
                            expected: issuer.to_string(),
                            found: document.issuer,
                        });
                    }
                    debug!(issuer = %issuer, url = %url, jwks_uri = %document.jwks_uri, "Discovered issuer metadata");
                    return Ok(document);
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Discovery candidate failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| DecoderBuildError::InvalidIssuerUrl(issuer.to_string())))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DecoderBuildError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DecoderBuildError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DecoderBuildError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DecoderBuildError::InvalidDocument(format!("{url}: {e}")))
    }
}

impl VerifierFactory for OidcVerifierFactory {
    fn build<'a>(&'a self, issuer: &'a IssuerUrl) -> BuildFuture<'a> {
        Box::pin(async move {
            let discovery = self.discover(issuer).await?;
            let jwks: JwksDocument = self.fetch_json(&discovery.jwks_uri).await?;
            let verifier = JwksVerifier::from_jwks(issuer.clone(), &jwks, self.options.clone())?;

            info!(issuer = %issuer, keys = verifier.key_count(), "Built verifier from issuer discovery");
            Ok(Arc::new(verifier) as Arc<dyn TokenVerifier>)
        })
    }
}
