//! Host-provider trait and registry

use crate::cancel::CancellationToken;
use crate::store::SecretStore;
use crate::{CoreError, Credential, Prompter, Request, Result};
use async_trait::async_trait;
use credman_config::Settings;
use std::sync::Arc;

/// Everything a provider needs to do its work, injected at process init.
///
/// Providers and their caches reference each other only through the handles
/// in here; no provider constructs its own collaborators.
#[derive(Clone)]
pub struct ProviderContext {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn SecretStore>,
    pub prompter: Arc<dyn Prompter>,
    pub http: reqwest::Client,
    pub cancel: CancellationToken,
}

/// A module that knows how to obtain credentials for one class of hosts.
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// Stable slug used by `credential.provider` overrides.
    fn id(&self) -> &'static str;

    /// Human-readable display name.
    fn name(&self) -> &'static str;

    /// Match predicate over a credential request. Must be deterministic and
    /// depend only on the request attributes.
    fn is_supported(&self, request: &Request) -> bool;

    /// Produce a credential for `get`. `Ok(None)` is a benign decline: the
    /// helper exits 0 with no output and Git falls through.
    async fn get_credential(&self, request: &Request) -> Result<Option<Credential>>;

    /// Persist a credential Git has just used successfully.
    async fn store_credential(&self, request: &Request) -> Result<()>;

    /// Discard a credential Git has just seen rejected.
    async fn erase_credential(&self, request: &Request) -> Result<()>;
}

/// Ordered provider list; the first matching provider wins.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn HostProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn HostProvider>) {
        self.providers.push(provider);
    }

    /// Select the provider for a request.
    ///
    /// A forced provider id (from `credential.provider` / `GCM_PROVIDER`)
    /// bypasses the match predicates entirely; an unknown forced id is a
    /// configuration error rather than a silent fallback.
    pub fn select(&self, request: &Request, forced: Option<&str>) -> Result<&dyn HostProvider> {
        if let Some(id) = forced {
            return self
                .providers
                .iter()
                .find(|p| p.id().eq_ignore_ascii_case(id))
                .map(|p| p.as_ref())
                .ok_or_else(|| CoreError::UnknownProvider(id.to_string()));
        }

        self.providers
            .iter()
            .find(|p| p.is_supported(request))
            .map(|p| p.as_ref())
            .ok_or(CoreError::NoProvider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        id: &'static str,
        matches: bool,
    }

    #[async_trait]
    impl HostProvider for StubProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Stub"
        }

        fn is_supported(&self, _request: &Request) -> bool {
            self.matches
        }

        async fn get_credential(&self, _request: &Request) -> Result<Option<Credential>> {
            Ok(Some(Credential::new(self.id, "secret")))
        }

        async fn store_credential(&self, _request: &Request) -> Result<()> {
            Ok(())
        }

        async fn erase_credential(&self, _request: &Request) -> Result<()> {
            Ok(())
        }
    }

    fn request() -> Request {
        Request::from_entries([("protocol", "https"), ("host", "example.com")])
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(StubProvider {
            id: "first",
            matches: false,
        }));
        registry.register(Box::new(StubProvider {
            id: "second",
            matches: true,
        }));
        registry.register(Box::new(StubProvider {
            id: "fallback",
            matches: true,
        }));
        registry
    }

    #[test]
    fn test_first_matching_provider_wins() {
        let registry = registry();
        assert_eq!(registry.select(&request(), None).unwrap().id(), "second");
    }

    #[test]
    fn test_forced_id_bypasses_predicates() {
        let registry = registry();
        assert_eq!(
            registry.select(&request(), Some("first")).unwrap().id(),
            "first"
        );
        // Forced lookup is case-insensitive
        assert_eq!(
            registry.select(&request(), Some("FALLBACK")).unwrap().id(),
            "fallback"
        );
    }

    #[test]
    fn test_unknown_forced_id_is_fatal() {
        let registry = registry();
        assert!(matches!(
            registry.select(&request(), Some("nonesuch")),
            Err(CoreError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_no_match_without_fallback() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(StubProvider {
            id: "only",
            matches: false,
        }));
        assert!(matches!(
            registry.select(&request(), None),
            Err(CoreError::NoProvider)
        ));
    }
}
