//! The protocol commands Git invokes: `get`, `store`, `erase`

use super::{build_context, load_settings};
use anyhow::Result;
use credman_config::Settings;
use credman_core::{read_request, write_response, CredentialManager, Request};
use credman_provider::{create_default_registry, AzureReposCache};
use std::io::Write;
use std::sync::Arc;

pub async fn get() -> Result<()> {
    let (request, manager, settings) = prepare()?;

    match manager.get(&request).await? {
        Some(credential) => {
            // Secrets are redacted from traces unless GCM_TRACE_SECRETS is on
            let password = if settings.trace_secrets() {
                credential.secret().to_string()
            } else {
                "********".to_string()
            };
            tracing::debug!(username = credential.account(), %password, "returning credential");

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write_response(&mut out, &request, &credential)?;
        }
        None => {
            // Benign decline: no output, exit zero, Git falls through to
            // the next configured helper or prompts itself.
            tracing::debug!("provider declined the request");
        }
    }
    Ok(())
}

pub async fn store() -> Result<()> {
    let (request, manager, _) = prepare()?;
    manager.store(&request).await?;
    Ok(())
}

pub async fn erase() -> Result<()> {
    let (request, manager, _) = prepare()?;
    manager.erase(&request).await?;
    Ok(())
}

/// Read the request dictionary, scope the settings to its remote, and wire
/// up the provider registry.
fn prepare() -> Result<(Request, CredentialManager, Arc<Settings>)> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let request = read_request(&mut input)?;

    let mut settings = load_settings();
    if let Ok(remote) = request.remote_url() {
        settings.set_remote(remote);
    }

    let context = build_context(settings)?;
    let cache = Arc::new(AzureReposCache::new(AzureReposCache::default_path()?));
    let registry = create_default_registry(&context, cache);
    let settings = context.settings.clone();
    let manager = CredentialManager::new(registry, settings.clone());

    // Make sure nothing we logged is sitting in stderr buffers while Git
    // waits on stdout.
    std::io::stderr().flush().ok();

    Ok((request, manager, settings))
}
