//! Request routing
//!
//! The manager validates an incoming request, picks a provider through the
//! registry, and delegates. All provider-specific behavior lives behind
//! [`HostProvider`](crate::HostProvider); the manager itself is thin on
//! purpose.

use crate::{CoreError, Credential, ProviderRegistry, Request, Result};
use credman_config::Settings;
use std::sync::Arc;

pub struct CredentialManager {
    registry: ProviderRegistry,
    settings: Arc<Settings>,
}

impl CredentialManager {
    pub fn new(registry: ProviderRegistry, settings: Arc<Settings>) -> Self {
        Self { registry, settings }
    }

    /// Serve a `get`: `Ok(None)` is a benign decline (exit 0, no output).
    pub async fn get(&self, request: &Request) -> Result<Option<Credential>> {
        let provider = self.select(request)?;
        tracing::debug!(provider = provider.id(), "serving get");
        provider.get_credential(request).await
    }

    pub async fn store(&self, request: &Request) -> Result<()> {
        if request.password().is_none() {
            return Err(CoreError::MalformedInput(
                "store request carries no password".into(),
            ));
        }
        let provider = self.select(request)?;
        tracing::debug!(provider = provider.id(), "serving store");
        provider.store_credential(request).await
    }

    pub async fn erase(&self, request: &Request) -> Result<()> {
        let provider = self.select(request)?;
        tracing::debug!(provider = provider.id(), "serving erase");
        provider.erase_credential(request).await
    }

    fn select(&self, request: &Request) -> Result<&dyn crate::HostProvider> {
        // Validates protocol and host up front
        request.remote_url()?;
        let forced = self.settings.provider_override();
        self.registry.select(request, forced.as_deref())
    }
}
