//! Azure Repos host provider
//!
//! Handles `dev.azure.com/<org>`, `<org>.dev.azure.com` and
//! `<org>.visualstudio.com` remotes. Tokens come from the organization's
//! OAuth authority (discovered once and cached); the signed-in user per
//! organization and remote lives in [`AzureReposCache`].

mod authority;
mod cache;

pub use cache::AzureReposCache;

use crate::{erase_credential_for, is_desktop_session, service_for, store_credential_for};
use async_trait::async_trait;
use credman_core::oauth::{OAuthClient, OAuthEndpoints, RefreshOutcome, SystemBrowser, TokenResult};
use credman_core::{
    CoreError, Credential, HostProvider, ProviderContext, Request, Result,
};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// The Visual Studio IDE client id, pre-consented for Azure DevOps.
const CLIENT_ID: &str = "872cd9fa-d31f-45e0-9eab-6e460a02d1f1";
/// `<Azure DevOps resource id>/.default`.
const DEVOPS_SCOPE: &str = "499b84ac-1321-427f-aa17-267ca6975798/.default";

/// Username Azure DevOps expects alongside a personal access token.
const PAT_USERNAME: &str = "PersonalAccessToken";
const PAT_SCOPES: &str = "vso.code_write vso.packaging";

const UNENCRYPTED_MESSAGE: &str = "Unencrypted HTTP is not supported for Azure Repos";

pub struct AzureReposProvider {
    context: ProviderContext,
    cache: Arc<AzureReposCache>,
}

#[derive(Debug, Deserialize)]
struct PatResponse {
    token: String,
}

impl AzureReposProvider {
    pub fn new(context: ProviderContext, cache: Arc<AzureReposCache>) -> Self {
        Self { context, cache }
    }

    /// The organization a remote belongs to, from either host shape.
    fn organization(remote: &Url) -> Option<String> {
        let host = remote.host_str()?.to_ascii_lowercase();

        if host == "dev.azure.com" {
            return remote
                .path_segments()?
                .find(|segment| !segment.is_empty())
                .map(str::to_string);
        }
        if let Some(org) = host.strip_suffix(".dev.azure.com") {
            if !org.is_empty() && !org.contains('.') {
                return Some(org.to_string());
            }
        }
        if let Some(rest) = host.strip_suffix(".visualstudio.com") {
            // <org>[.vs-ssh].visualstudio.com
            return rest.split('.').next().map(str::to_string).filter(|s| !s.is_empty());
        }
        None
    }

    fn is_azure_host(host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
        host == "dev.azure.com"
            || host.ends_with(".dev.azure.com")
            || host.ends_with(".visualstudio.com")
    }

    /// The canonical organization URL, matching the remote's host style.
    /// The trailing slash matters: relative joins must not replace the
    /// organization path segment.
    fn organization_url(remote: &Url, org: &str) -> Result<Url> {
        let host = remote.host_str().unwrap_or_default().to_ascii_lowercase();
        let raw = if host.ends_with(".visualstudio.com") {
            format!("https://{org}.visualstudio.com/")
        } else {
            format!("https://dev.azure.com/{org}/")
        };
        Url::parse(&raw).map_err(|e| CoreError::Internal(format!("bad organization URL: {e}")))
    }

    fn require_https(request: &Request) -> Result<()> {
        if request.protocol()? == "http" {
            return Err(CoreError::UnsupportedProtocol(UNENCRYPTED_MESSAGE.into()));
        }
        Ok(())
    }

    fn parse_remote(request: &Request) -> Result<(Url, String)> {
        let remote = request.remote_url()?;
        let org = Self::organization(&remote).ok_or_else(|| {
            CoreError::AuthFailed(format!(
                "cannot determine the Azure DevOps organization from '{remote}'"
            ))
        })?;
        Ok((remote, org))
    }

    /// Authority for the organization: cache first, then one unauthenticated
    /// probe whose result is cached for future invocations.
    async fn authority_for(&self, remote: &Url, org: &str) -> Result<String> {
        if let Some(cached) = self.cache.get_authority(org) {
            tracing::debug!(org, authority = %cached, "using cached authority");
            return Ok(cached);
        }

        let org_url = Self::organization_url(remote, org)?;
        let discovered =
            authority::discover(&self.context.http, &org_url, &self.context.cancel).await?;
        self.cache.update_authority(org, &discovered)?;
        tracing::debug!(org, authority = %discovered, "cached discovered authority");
        Ok(discovered)
    }

    fn oauth_client(&self, authority: &str) -> OAuthClient {
        let endpoints = OAuthEndpoints {
            authorize: format!("{authority}/oauth2/v2.0/authorize"),
            token: format!("{authority}/oauth2/v2.0/token"),
            device: Some(format!("{authority}/oauth2/v2.0/devicecode")),
        };
        OAuthClient::new(self.context.http.clone(), endpoints, CLIENT_ID.to_string())
    }

    /// Where refresh tokens for an authority are filed.
    fn refresh_service(&self, authority: &str) -> String {
        format!("{}:oauth-refresh:{authority}", self.context.settings.namespace())
    }

    /// Acquire an Azure AD access token: a stored refresh token for the
    /// signed-in user is tried first; interactive flows are the fallback.
    async fn acquire_token(&self, authority: &str, user: Option<&str>) -> Result<TokenResult> {
        let client = self.oauth_client(authority);
        let scopes = [DEVOPS_SCOPE];
        let refresh_service = self.refresh_service(authority);

        if let Some(user) = user {
            if let Some(stored) = self.context.store.get(&refresh_service, Some(user))? {
                match client
                    .refresh(stored.secret(), &scopes, &self.context.cancel)
                    .await?
                {
                    RefreshOutcome::Refreshed(token) => return Ok(token),
                    RefreshOutcome::Rejected => {
                        tracing::debug!(user, "stored refresh token rejected");
                        self.context.store.remove(&refresh_service, user)?;
                    }
                }
            }
        }

        if !self.context.settings.is_interactive()? {
            return Err(CoreError::InteractionDisabled);
        }

        let flow = self
            .context
            .settings
            .msauth_flow()
            .unwrap_or_else(|| "auto".to_string());
        let use_browser = match flow.to_ascii_lowercase().as_str() {
            "devicecode" => false,
            "system" => true,
            "embedded" => {
                tracing::debug!("embedded web views are not available; using the system browser");
                true
            }
            _ => is_desktop_session(),
        };

        let token = if use_browser {
            client
                .authorization_code(&scopes, user, &SystemBrowser, &self.context.cancel)
                .await?
        } else {
            client
                .device_code(&scopes, self.context.prompter.as_ref(), &self.context.cancel)
                .await?
        };

        if let (Some(refresh), Some(account)) = (&token.refresh_token, &token.account) {
            self.context
                .store
                .add_or_update(&refresh_service, &Credential::new(account, refresh))?;
        }
        Ok(token)
    }

    /// Trade a bearer token for a repository-scoped personal access token,
    /// for organizations configured with `credential.azreposCredentialType=pat`.
    async fn exchange_for_pat(
        &self,
        remote: &Url,
        org: &str,
        access_token: &str,
    ) -> Result<String> {
        let org_url = Self::organization_url(remote, org)?;
        let endpoint = org_url
            .join("_apis/token/sessiontokens?api-version=1.0&tokentype=compact")
            .map_err(|e| CoreError::Internal(format!("bad PAT endpoint: {e}")))?;

        let body = serde_json::json!({
            "scope": PAT_SCOPES,
            "displayName": format!("Git: {org_url}"),
        });

        let response = self
            .context
            .http
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&body)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CoreError::AuthFailed(format!(
                "personal access token creation failed with {}",
                response.status()
            )));
        }
        let pat: PatResponse = response.json().await?;
        Ok(pat.token)
    }

    fn wants_pat(&self) -> bool {
        self.context
            .settings
            .azrepos_credential_type()
            .map(|v| v.eq_ignore_ascii_case("pat"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl HostProvider for AzureReposProvider {
    fn id(&self) -> &'static str {
        "azure-repos"
    }

    fn name(&self) -> &'static str {
        "Azure Repos"
    }

    /// Matches plain HTTP too: the provider still claims the request so it
    /// can reject it with a clear message instead of falling through to the
    /// generic prompt.
    fn is_supported(&self, request: &Request) -> bool {
        if !matches!(request.protocol(), Ok("http" | "https")) {
            return false;
        }
        matches!(request.host(), Ok(host) if Self::is_azure_host(host))
    }

    async fn get_credential(&self, request: &Request) -> Result<Option<Credential>> {
        Self::require_https(request)?;
        let (remote, org) = Self::parse_remote(request)?;
        let service = service_for(&self.context, &remote)?;

        if let Some(stored) = self.context.store.get(&service, request.username())? {
            tracing::debug!(%service, "serving stored credential");
            return Ok(Some(stored));
        }

        let authority = self.authority_for(&remote, &org).await?;
        let user = match request.username() {
            Some(username) => Some(username.to_string()),
            None => self.cache.effective_user(&org, &remote),
        };

        let token = self.acquire_token(&authority, user.as_deref()).await?;
        let account = token
            .account
            .clone()
            .or(user)
            .unwrap_or_else(|| "AzureReposUser".to_string());

        if self.wants_pat() {
            let pat = self
                .exchange_for_pat(&remote, &org, &token.access_token)
                .await?;
            return Ok(Some(Credential::new(PAT_USERNAME, pat)));
        }

        Ok(Some(Credential::new(account, token.access_token)))
    }

    async fn store_credential(&self, request: &Request) -> Result<()> {
        let (remote, org) = Self::parse_remote(request)?;
        let username = request.username().ok_or_else(|| {
            CoreError::MalformedInput("store request carries no username".into())
        })?;
        store_credential_for(&self.context, request, &remote)?;
        self.cache.record_store(&org, &remote, username)
    }

    async fn erase_credential(&self, request: &Request) -> Result<()> {
        let (remote, org) = Self::parse_remote(request)?;
        erase_credential_for(&self.context, request, &remote)?;
        self.cache.record_erase(&org, &remote)
    }
}
