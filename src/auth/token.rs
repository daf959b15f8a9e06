//! Unverified token inspection.
//!
//! Reads just enough of a compact JWS to learn which issuer claims to have
//! signed it. Nothing read here is trusted: the issuer only selects the
//! verifier, and that verifier checks `iss` again after the signature.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::auth::error::AuthError;

/// A bearer token whose payload has been decoded but not verified.
#[derive(Debug, Clone)]
pub struct UnverifiedToken<'a> {
    raw: &'a str,
    claims: Map<String, Value>,
}

impl<'a> UnverifiedToken<'a> {
    /// Split and decode a compact JWS without checking its signature.
    pub fn parse(raw: &'a str) -> Result<Self, AuthError> {
        let mut segments = raw.split('.');
        let (Some(header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        if header.is_empty() || payload.is_empty() {
            return Err(AuthError::MalformedToken("empty segment".to_string()));
        }

        decode_object(header, "header")?;
        let claims = decode_object(payload, "payload")?;

        Ok(Self { raw, claims })
    }

    /// The token exactly as presented.
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Every unverified claim.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Look up an unverified claim.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// The claimed `iss`, if present and non-empty.
    pub fn issuer(&self) -> Result<&str, AuthError> {
        match self.claim("iss").and_then(Value::as_str) {
            Some(iss) if !iss.is_empty() => Ok(iss),
            _ => Err(AuthError::MissingIssuerClaim),
        }
    }
}

/// Read the `iss` claim of a token without verifying it.
pub fn extract_issuer(token: &str) -> Result<String, AuthError> {
    UnverifiedToken::parse(token)?.issuer().map(str::to_string)
}

fn decode_object(segment: &str, what: &str) -> Result<Map<String, Value>, AuthError> {
    // Some issuers keep base64 padding in tokens even though JWS forbids it.
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("{what} is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuthError::MalformedToken(format!(
            "{what} is not a JSON object"
        ))),
        Err(e) => Err(AuthError::MalformedToken(format!(
            "{what} is not valid JSON: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(value: serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap())
    }

    fn token_with_payload(payload: serde_json::Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            segment(serde_json::json!({"alg": "RS256", "typ": "JWT"})),
            segment(payload)
        )
    }

    #[test]
    fn test_extract_issuer() {
        let token = token_with_payload(serde_json::json!({
            "iss": "https://issuer.acme.example",
            "sub": "user-1",
            "exp": 1
        }));
        assert_eq!(extract_issuer(&token).unwrap(), "https://issuer.acme.example");
    }

    #[test]
    fn test_unverified_claims_are_exposed() {
        let token = token_with_payload(serde_json::json!({
            "iss": "https://issuer.acme.example",
            "sub": "user-1"
        }));
        let parsed = UnverifiedToken::parse(&token).unwrap();
        assert_eq!(parsed.raw(), token);
        assert_eq!(parsed.claim("sub").and_then(Value::as_str), Some("user-1"));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(br#"{"iss":"https://a.example"}"#);
        assert!(payload.ends_with('='));
        let token = format!("{}.{payload}.sig", segment(serde_json::json!({"alg": "RS256"})));
        assert_eq!(extract_issuer(&token).unwrap(), "https://a.example");
    }

    #[test]
    fn test_missing_issuer_claim() {
        for payload in [
            serde_json::json!({"sub": "user-1"}),
            serde_json::json!({"iss": ""}),
            serde_json::json!({"iss": 42}),
            serde_json::json!({"iss": null}),
        ] {
            let token = token_with_payload(payload);
            assert!(matches!(
                extract_issuer(&token),
                Err(AuthError::MissingIssuerClaim)
            ));
        }
    }

    #[test]
    fn test_malformed_tokens() {
        let header = segment(serde_json::json!({"alg": "RS256"}));
        let cases = [
            String::new(),
            "not-a-jwt".to_string(),
            "a.b".to_string(),
            format!("{header}.{}.sig.extra.segments", segment(serde_json::json!({}))),
            format!("{header}..sig"),
            format!("{header}.!!!notbase64!!!.sig"),
            format!("{header}.{}.sig", URL_SAFE_NO_PAD.encode(b"not json")),
            format!("{header}.{}.sig", segment(serde_json::json!(["iss"]))),
            format!(
                "{}.{}.sig",
                URL_SAFE_NO_PAD.encode(b"garbage"),
                segment(serde_json::json!({"iss": "https://a.example"}))
            ),
        ];

        for token in cases {
            assert!(
                matches!(extract_issuer(&token), Err(AuthError::MalformedToken(_))),
                "expected malformed: {token:?}"
            );
        }
    }

    #[test]
    fn test_unsigned_token_still_parses() {
        // An empty signature segment is a verification problem, not a parsing one.
        let token = format!(
            "{}.{}.",
            segment(serde_json::json!({"alg": "none"})),
            segment(serde_json::json!({"iss": "https://issuer.acme.example"}))
        );
        assert_eq!(extract_issuer(&token).unwrap(), "https://issuer.acme.example");
    }
}
