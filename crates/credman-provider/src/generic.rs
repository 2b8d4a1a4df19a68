//! Generic host provider
//!
//! Terminal fallback for any HTTP(S) remote no specialized provider
//! claims. Serves stored credentials, defers to Windows integrated
//! authentication when the server offers it and the user opted in, and
//! otherwise asks for basic credentials.

use crate::{erase_credential_for, service_for, store_credential_for};
use credman_core::{canonical_url, Credential, HostProvider, ProviderContext, Request, Result};
use async_trait::async_trait;

pub struct GenericProvider {
    context: ProviderContext,
}

impl GenericProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    /// Whether the server's challenges include a Windows integrated
    /// authentication scheme (Negotiate or NTLM).
    fn offers_windows_auth(request: &Request) -> bool {
        request.www_auth().iter().any(|challenge| {
            let scheme = challenge
                .split_whitespace()
                .next()
                .unwrap_or_default();
            scheme.eq_ignore_ascii_case("negotiate") || scheme.eq_ignore_ascii_case("ntlm")
        })
    }
}

#[async_trait]
impl HostProvider for GenericProvider {
    fn id(&self) -> &'static str {
        "generic"
    }

    fn name(&self) -> &'static str {
        "Generic"
    }

    fn is_supported(&self, _request: &Request) -> bool {
        true
    }

    async fn get_credential(&self, request: &Request) -> Result<Option<Credential>> {
        let remote = request.remote_url()?;
        let service = service_for(&self.context, &remote)?;

        if let Some(stored) = self.context.store.get(&service, request.username())? {
            tracing::debug!(%service, "serving stored credential");
            return Ok(Some(stored));
        }

        if cfg!(windows)
            && self.context.settings.allow_windows_auth()?
            && Self::offers_windows_auth(request)
        {
            tracing::debug!("deferring to Windows integrated authentication");
            return Ok(Some(Credential::transport_negotiate()));
        }

        if !self.context.settings.is_interactive()? {
            return Err(credman_core::CoreError::InteractionDisabled);
        }

        let resource = canonical_url(&remote, true);
        let credential = self
            .context
            .prompter
            .prompt_basic(&resource, request.username())
            .await?;
        Ok(Some(credential))
    }

    async fn store_credential(&self, request: &Request) -> Result<()> {
        let remote = request.remote_url()?;
        store_credential_for(&self.context, request, &remote)
    }

    async fn erase_credential(&self, request: &Request) -> Result<()> {
        let remote = request.remote_url()?;
        erase_credential_for(&self.context, request, &remote)
    }
}
