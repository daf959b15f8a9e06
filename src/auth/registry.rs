//! Tenant → issuer registry.
//!
//! Bootstrapped once from static configuration and extended at runtime by the
//! admin API. Lookups come from the request path with only an issuer string in
//! hand, so resolution scans values rather than keys.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::error::AuthError;
use crate::types::{IssuerUrl, TenantId};

/// Concurrent mapping from tenant identifier to issuer base URL.
///
/// Sharded, so registering one tenant never waits on lookups for another.
#[derive(Debug, Default)]
pub struct IssuerRegistry {
    tenants: DashMap<TenantId, IssuerUrl>,
}

impl IssuerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load the statically configured tenants.
    ///
    /// Called once during startup, before the registry serves any request.
    pub fn initialize_with_static(&self, mapping: BTreeMap<TenantId, IssuerUrl>) {
        let count = mapping.len();
        for (tenant_id, issuer) in mapping {
            self.tenants.insert(tenant_id, issuer);
        }
        info!(tenants = count, "Loaded static tenant issuers");
    }

    /// Insert or overwrite the issuer for a tenant.
    pub fn register(&self, tenant_id: TenantId, issuer: IssuerUrl) {
        info!(tenant_id = %tenant_id, issuer = %issuer, "Registered tenant issuer");
        if let Some(previous) = self.tenants.insert(tenant_id, issuer) {
            debug!(previous = %previous, "Replaced previous issuer for tenant");
        }
    }

    /// Confirm that `claimed` is the issuer of some registered tenant.
    pub fn resolve_issuer(&self, claimed: &str) -> Result<IssuerUrl, AuthError> {
        self.tenants
            .iter()
            .find(|entry| entry.value().as_str() == claimed)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::UnknownIssuer)
    }

    /// Point-in-time copy of every tenant mapping, ordered by tenant id.
    pub fn all_issuers(&self) -> BTreeMap<TenantId, IssuerUrl> {
        self.tenants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of registered tenants.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn acme() -> (TenantId, IssuerUrl) {
        (
            TenantId::new("acme"),
            IssuerUrl::new("https://issuer.acme.example"),
        )
    }

    #[test]
    fn test_resolve_registered_issuer_is_identity() {
        let registry = IssuerRegistry::new();
        let (tenant, issuer) = acme();
        registry.register(tenant, issuer.clone());
        registry.register(
            TenantId::new("globex"),
            IssuerUrl::new("https://login.globex.example/realms/globex"),
        );

        assert_eq!(registry.resolve_issuer(issuer.as_str()).unwrap(), issuer);
        assert_eq!(
            registry
                .resolve_issuer("https://login.globex.example/realms/globex")
                .unwrap()
                .as_str(),
            "https://login.globex.example/realms/globex"
        );
    }

    #[test]
    fn test_resolve_unknown_issuer_fails() {
        let registry = IssuerRegistry::new();
        let (tenant, issuer) = acme();
        registry.register(tenant, issuer);

        for claimed in [
            "https://unregistered.example",
            "https://issuer.acme.example/",
            "acme",
            "",
        ] {
            assert!(matches!(
                registry.resolve_issuer(claimed),
                Err(AuthError::UnknownIssuer)
            ));
        }
    }

    #[test]
    fn test_register_overwrites_previous_issuer() {
        let registry = IssuerRegistry::new();
        registry.register(TenantId::new("acme"), IssuerUrl::new("https://old.acme.example"));
        registry.register(TenantId::new("acme"), IssuerUrl::new("https://new.acme.example"));

        assert!(registry.resolve_issuer("https://new.acme.example").is_ok());
        assert!(registry.resolve_issuer("https://old.acme.example").is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.all_issuers().get("acme"),
            Some(&IssuerUrl::new("https://new.acme.example"))
        );
    }

    #[test]
    fn test_static_then_runtime_registration() {
        let registry = IssuerRegistry::new();
        let mut mapping = BTreeMap::new();
        mapping.insert(
            TenantId::new("acme"),
            IssuerUrl::new("https://issuer.acme.example"),
        );
        mapping.insert(
            TenantId::new("initech"),
            IssuerUrl::new("https://sso.initech.example"),
        );
        registry.initialize_with_static(mapping);

        registry.register(
            TenantId::new("initech"),
            IssuerUrl::new("https://idp.initech.example"),
        );
        registry.register(TenantId::new("umbrella"), IssuerUrl::new("https://umbrella.example"));

        let snapshot = registry.all_issuers();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["initech"].as_str(), "https://idp.initech.example");
        assert_eq!(snapshot["umbrella"].as_str(), "https://umbrella.example");
    }

    #[test]
    fn test_snapshot_is_not_live() {
        let registry = IssuerRegistry::new();
        let (tenant, issuer) = acme();
        registry.register(tenant, issuer);

        let snapshot = registry.all_issuers();
        registry.register(TenantId::new("globex"), IssuerUrl::new("https://globex.example"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.all_issuers().len(), 2);
    }

    #[test]
    fn test_empty_registry() {
        let registry = IssuerRegistry::new();
        registry.initialize_with_static(BTreeMap::new());
        assert!(registry.is_empty());
        assert!(registry.resolve_issuer("https://issuer.acme.example").is_err());
    }

    #[test]
    fn test_concurrent_registration_and_resolution() {
        let registry = Arc::new(IssuerRegistry::new());
        let (tenant, issuer) = acme();
        registry.register(tenant, issuer);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        registry.register(
                            TenantId::new(format!("tenant-{i}-{j}")),
                            IssuerUrl::new(format!("https://idp-{i}-{j}.example")),
                        );
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.resolve_issuer("https://issuer.acme.example").is_ok());
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 801);
        assert!(registry.resolve_issuer("https://idp-7-99.example").is_ok());
    }
}
