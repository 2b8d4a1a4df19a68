//! Host providers for credman
//!
//! This crate implements the providers the registry dispatches between
//! (Azure Repos, GitHub, and the generic fallback) together with the Azure
//! sign-in/authority cache. [`create_default_registry`] wires them up in
//! match order.

mod azure;
mod generic;
mod github;

pub use azure::{AzureReposCache, AzureReposProvider};
pub use generic::GenericProvider;
pub use github::{AuthModes, GitHubProvider};

use credman_core::{
    service_key, CoreError, Credential, ProviderContext, ProviderRegistry, Request, Result,
};
use std::sync::Arc;
use url::Url;

/// Build the standard provider registry. Azure Repos and GitHub are
/// consulted in order; the generic provider is the terminal fallback and
/// matches everything.
///
/// The Azure cache is constructed by the caller and injected, so the
/// provider and anything else holding the handle share one view of it.
pub fn create_default_registry(
    context: &ProviderContext,
    azure_cache: Arc<AzureReposCache>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(AzureReposProvider::new(context.clone(), azure_cache)));
    registry.register(Box::new(GitHubProvider::new(context.clone())));
    registry.register(Box::new(GenericProvider::new(context.clone())));
    registry
}

/// The storage key for a remote, honoring the configured namespace and
/// `credential.useHttpPath`.
pub(crate) fn service_for(context: &ProviderContext, url: &Url) -> Result<String> {
    let use_path = context.settings.use_http_path()?;
    Ok(service_key(&context.settings.namespace(), url, use_path))
}

/// Default `store` handling: upsert the credential Git just validated.
pub(crate) fn store_credential_for(
    context: &ProviderContext,
    request: &Request,
    url: &Url,
) -> Result<()> {
    let username = request.username().ok_or_else(|| {
        CoreError::MalformedInput("store request carries no username".into())
    })?;
    let password = request.password().ok_or_else(|| {
        CoreError::MalformedInput("store request carries no password".into())
    })?;
    let service = service_for(context, url)?;
    context
        .store
        .add_or_update(&service, &Credential::new(username, password))
}

/// Default `erase` handling: drop whatever is filed for the remote,
/// keyed by the request's username when Git supplied one.
pub(crate) fn erase_credential_for(
    context: &ProviderContext,
    request: &Request,
    url: &Url,
) -> Result<()> {
    let service = service_for(context, url)?;
    let removed = match request.username() {
        Some(username) => context.store.remove(&service, username)?,
        None => match context.store.get(&service, None)? {
            Some(existing) => context.store.remove(&service, existing.account())?,
            None => false,
        },
    };
    if !removed {
        tracing::debug!(%service, "nothing stored to erase");
    }
    Ok(())
}

/// Whether a browser-based flow can reach the user. On Unix this means a
/// graphical session is present; Windows and macOS terminals can always
/// hand off to the default browser.
pub(crate) fn is_desktop_session() -> bool {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        return true;
    }
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}
