use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::auth::{DEFAULT_BUILD_TIMEOUT_SECONDS, VerifierOptions, jwks::DEFAULT_LEEWAY_SECONDS};
use crate::types::{IssuerUrl, TenantId};

/// Whether tenants may be registered while the gateway is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TenantMode {
    /// Only the tenants from the configuration file.
    #[default]
    Static,
    /// Configuration file plus runtime registration through the admin API.
    Dynamic,
}

impl TenantMode {
    pub fn allows_registration(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default)]
    pub mode: TenantMode,
    #[serde(default)]
    pub issuers: BTreeMap<TenantId, IssuerUrl>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_leeway_seconds")]
    pub leeway_seconds: u64,
    #[serde(default = "default_build_timeout_seconds")]
    pub build_timeout_seconds: u64,
}

fn default_leeway_seconds() -> u64 {
    DEFAULT_LEEWAY_SECONDS
}

fn default_build_timeout_seconds() -> u64 {
    DEFAULT_BUILD_TIMEOUT_SECONDS
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: TenantMode::default(),
            issuers: BTreeMap::new(),
            audience: None,
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
            build_timeout_seconds: DEFAULT_BUILD_TIMEOUT_SECONDS,
        }
    }
}

impl SecurityConfig {
    pub fn verifier_options(&self) -> VerifierOptions {
        VerifierOptions {
            leeway_seconds: self.leeway_seconds,
            audience: self.audience.clone(),
        }
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_seconds)
    }

    fn expand_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.issuers = self
            .issuers
            .into_iter()
            .map(|(tenant, issuer)| {
                let expanded = expand_env_vars_with(issuer.as_str(), &lookup);
                (tenant, IssuerUrl::new(expanded))
            })
            .collect();
        if let Some(audience) = self.audience.as_mut() {
            *audience = expand_env_vars_with(audience, &lookup);
        }
        self
    }
}

/// Locate the tenant file: explicit path, then `GATEWAY_CONFIG`, then the
/// XDG config directory, then `./tenants.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    if let Ok(p) = env::var("GATEWAY_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg)
            .join("issuer-gateway")
            .join("tenants.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("tenants.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Load the security section of the tenant file.
///
/// Falls back to an empty static configuration when no file can be found.
/// A file that was named explicitly but cannot be read is an error.
pub fn load_security_config(explicit: Option<&Path>) -> anyhow::Result<SecurityConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        tracing::info!("No tenant configuration found, starting with an empty static registry");
        return Ok(SecurityConfig::default());
    };

    let config = load_security_config_from(&path)?;
    tracing::info!(
        path = %path.display(),
        tenants = config.issuers.len(),
        mode = ?config.mode,
        "Loaded tenant configuration"
    );
    Ok(config)
}

pub fn load_security_config_from(path: &Path) -> anyhow::Result<SecurityConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read tenant configuration {}", path.display()))?;
    parse_security_config(&raw, |name| env::var(name).ok())
        .with_context(|| format!("invalid tenant configuration {}", path.display()))
}

fn parse_security_config(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<SecurityConfig> {
    let file: GatewayConfigFile = serde_json::from_str(raw)?;
    Ok(file.security.expand_with(lookup))
}

/// Replace `${NAME}` with `lookup(NAME)`, keeping unresolved references as-is.
pub fn expand_env_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            match lookup(&name) {
                Some(val) if closed => out.push_str(&val),
                _ => {
                    out.push_str("${");
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}
