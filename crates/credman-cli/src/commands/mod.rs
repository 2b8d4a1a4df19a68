//! CLI command implementations

mod manage;
mod service;

pub use manage::*;
pub use service::*;

use anyhow::Result;
use credman_config::{GitConfigSource, MemoryConfigSource, Settings};
use credman_core::cancel::CancellationSource;
use credman_core::store::{create_store, StoreOptions};
use credman_core::{DisabledPrompter, Prompter, ProviderContext, TerminalPrompter};
use std::sync::Arc;

/// Assemble the provider context for one request: settings scoped to the
/// remote, the configured secret store, a prompter, a shared HTTP client,
/// and a cancellation token tripped by Ctrl-C.
pub(crate) fn build_context(settings: Settings) -> Result<ProviderContext> {
    let settings = Arc::new(settings);

    let store = create_store(&StoreOptions {
        backend: settings.credential_store(),
        plaintext_path: settings.plaintext_store_path(),
    })?;

    let prompter: Arc<dyn Prompter> = if settings.is_interactive()? {
        Arc::new(TerminalPrompter::new())
    } else {
        Arc::new(DisabledPrompter)
    };

    let mut http = reqwest::Client::builder()
        .user_agent(concat!("credman/", env!("CARGO_PKG_VERSION")));
    if let Some(proxy) = settings.http_proxy() {
        http = http.proxy(reqwest::Proxy::all(&proxy)?);
    }

    let (source, cancel) = CancellationSource::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received; cancelling");
            source.cancel();
        }
    });

    Ok(ProviderContext {
        settings,
        store: Arc::from(store),
        prompter,
        http: http.build()?,
        cancel,
    })
}

/// Settings over the Git configuration visible from the current directory.
/// A missing `git` binary degrades to environment-only resolution so that
/// `version` and friends still work.
pub(crate) fn load_settings() -> Settings {
    match GitConfigSource::load() {
        Ok(source) => Settings::new(Box::new(source)),
        Err(e) => {
            tracing::warn!("cannot read git configuration: {e}");
            Settings::new(Box::new(MemoryConfigSource::default()))
        }
    }
}
