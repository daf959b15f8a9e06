//! Shared fixtures for authentication tests: a test issuer key pair, token
//! minting, wiremock-backed issuers and a scriptable verifier factory.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::error::DecoderBuildError;
use crate::auth::jwks::{JwksDocument, JwksVerifier, VerifierOptions};
use crate::auth::verifier::{BuildFuture, TokenVerifier, VerifierFactory};
use crate::types::IssuerUrl;

/// Private key whose public half is published by every test issuer.
pub const ISSUER_KEY_PEM: &str = include_str!("testdata/issuer_rsa.pem");

/// A key no test issuer publishes.
pub const ROGUE_KEY_PEM: &str = include_str!("testdata/rogue_rsa.pem");

pub const ISSUER_KEY_N: &str = "wM8gy08Zpu8FdCtS9jmrfavqO7BILPc4pGh7MkNCPYHpmzCih3oy0fFaQ7hYIZF_T78wLx4PDQr8jydLvf7_6DXKa_VAaSpedDd4BbMgMMDQPzPiCuI-Cv5CHlPM9KQEePT2iicQZ1OSI5SyUC4X16NEylWFe0OxavVVZGcwGvnuHG-xbphTRa5wNluRS_pptGqo9WAVZll1bcrG8WKH_J1NIXkaM7LkfkHURTa_kcmQ3DhM6MsTFWcOpzurj26axoTez5doWVTxhlmP9UOb-6rMtuPxpQlPHF3Bu9EchEjjIjD_xtUCQ6hjUoXqfVbpTGC5nvc3myCA0prTAp14JQ";
pub const ISSUER_KEY_E: &str = "AQAB";
pub const TEST_KID: &str = "acme-2024";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// JWKS publishing the test issuer key.
pub fn issuer_jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "alg": "RS256",
            "use": "sig",
            "n": ISSUER_KEY_N,
            "e": ISSUER_KEY_E,
        }]
    })
}

pub fn issuer_jwks_document() -> JwksDocument {
    serde_json::from_value(issuer_jwks()).unwrap()
}

/// Claims for a token that is valid for the next ten minutes.
pub fn claims_for(issuer: &str) -> Value {
    let now = now();
    json!({
        "iss": issuer,
        "sub": "user-1",
        "iat": now,
        "exp": now + 600,
    })
}

/// Sign claims with the test issuer key.
pub fn sign(claims: &Value) -> String {
    sign_with(ISSUER_KEY_PEM, Some(TEST_KID), claims)
}

pub fn sign_with(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// HTTP client that never routes loopback mock servers through a proxy.
pub fn test_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Serve discovery and JWKS for `server.uri()` as an issuer, expecting
/// each endpoint to be hit exactly `calls` times.
pub async fn mount_issuer(server: &MockServer, calls: u64) {
    mount_issuer_with_delay(server, calls, Duration::ZERO).await;
}

pub async fn mount_issuer_with_delay(server: &MockServer, calls: u64, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "issuer": server.uri(),
                    "jwks_uri": format!("{}/jwks", server.uri()),
                }))
                .set_delay(delay),
        )
        .expect(calls)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issuer_jwks()))
        .expect(calls)
        .mount(server)
        .await;
}

/// Verifier factory with scripted latency and failures.
///
/// Every successful build yields a [`JwksVerifier`] over the test issuer key.
pub struct FakeFactory {
    builds: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
    slow_issuer: Option<(String, Duration)>,
    panics: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            builds: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
            slow_issuer: None,
            panics: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` builds before succeeding.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Make builds for one issuer take `delay`, leaving others fast.
    pub fn slow_for(mut self, issuer: &str, delay: Duration) -> Self {
        self.slow_issuer = Some((issuer.to_string(), delay));
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl VerifierFactory for FakeFactory {
    fn build<'a>(&'a self, issuer: &'a IssuerUrl) -> BuildFuture<'a> {
        Box::pin(async move {
            self.builds.fetch_add(1, Ordering::SeqCst);

            let delay = match &self.slow_issuer {
                Some((slow, delay)) if slow == issuer.as_str() => *delay,
                _ => self.delay,
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self.panics {
                panic!("verifier factory blew up");
            }

            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DecoderBuildError::Http("connection refused".to_string()));
            }

            let verifier = JwksVerifier::from_jwks(
                issuer.clone(),
                &issuer_jwks_document(),
                VerifierOptions::default(),
            )?;
            Ok(Arc::new(verifier) as Arc<dyn TokenVerifier>)
        })
    }
}
