//! NewType wrappers for the identifiers the gateway passes around.
//!
//! Tenant identifiers and issuer URLs are both plain strings on the wire, and
//! the registry maps one onto the other, so keeping them apart at the type
//! level stops a tenant id from being looked up as an issuer (or vice versa).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Operator-chosen identifier of a tenant (e.g., "acme").
    ///
    /// Unique within the issuer registry. Never derived from a token: the
    /// request path only ever learns the issuer, not the tenant.
    TenantId
);

newtype_string!(
    /// Base URL of an identity provider (e.g., "https://issuer.acme.example").
    ///
    /// Compared byte-for-byte against the `iss` claim, so a trailing slash
    /// is significant.
    IssuerUrl
);
