//! GitHub host provider
//!
//! Covers github.com, gists, and GitHub Enterprise Server instances whose
//! host name leads with `github.` or `gist.github.`. Authentication can run
//! over the browser (authorization-code + PKCE), the device-code flow, a
//! personal access token prompt, or basic credentials; the mode set comes
//! from `credential.gitHubAuthModes` or is auto-detected per host.

use crate::{erase_credential_for, is_desktop_session, service_for, store_credential_for};
use async_trait::async_trait;
use credman_core::oauth::{OAuthClient, OAuthEndpoints, SystemBrowser, TokenResult};
use credman_core::{
    CoreError, Credential, HostProvider, ProviderContext, Request, Result,
};
use serde::Deserialize;
use url::Url;

/// OAuth application credentials for the credential helper. GitHub requires
/// the client secret on the code exchange even for native applications; the
/// pair is public by design.
const OAUTH_CLIENT_ID: &str = "0120e057bd645470c1ed";
const OAUTH_CLIENT_SECRET: &str = "18867509d956965542b521a529a79bb883344c90";
const OAUTH_SCOPES: &[&str] = &["repo", "gist", "workflow"];

const DOTCOM_HOST: &str = "github.com";

/// The set of allowed authentication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthModes {
    pub basic: bool,
    pub oauth: bool,
    pub devcode: bool,
    pub pat: bool,
}

impl AuthModes {
    /// Parse a space- or comma-separated mode list. Returns `None` when no
    /// recognized mode is present (callers then auto-detect).
    pub fn parse(value: &str) -> Option<Self> {
        let mut modes = AuthModes {
            basic: false,
            oauth: false,
            devcode: false,
            pat: false,
        };
        for word in value.split([' ', ',']).filter(|w| !w.is_empty()) {
            match word.to_ascii_lowercase().as_str() {
                "basic" => modes.basic = true,
                "oauth" | "browser" => modes.oauth = true,
                "devcode" | "device" => modes.devcode = true,
                "pat" => modes.pat = true,
                other => tracing::warn!("ignoring unknown GitHub auth mode '{other}'"),
            }
        }
        if modes.basic || modes.oauth || modes.devcode || modes.pat {
            Some(modes)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    verifiable_password_authentication: bool,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

pub struct GitHubProvider {
    context: ProviderContext,
}

impl GitHubProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    fn is_github_host(host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
        if host == DOTCOM_HOST || host == format!("gist.{DOTCOM_HOST}") {
            return true;
        }
        // GHES conventionally lives at github.<company>.<tld>
        match host.split_once('.') {
            Some(("github", rest)) => !rest.is_empty(),
            Some(("gist", rest)) => {
                matches!(rest.split_once('.'), Some(("github", tail)) if !tail.is_empty())
            }
            _ => false,
        }
    }

    /// Gist hosts share credentials with the parent instance; strip the
    /// `gist.` label before building storage keys.
    fn normalized_remote(remote: &Url) -> Url {
        let mut remote = remote.clone();
        let parent = remote
            .host_str()
            .and_then(|host| host.strip_prefix("gist."))
            .map(str::to_string);
        if let Some(parent) = parent {
            let _ = remote.set_host(Some(&parent));
        }
        remote
    }

    fn is_dotcom(host: &str) -> bool {
        host.eq_ignore_ascii_case(DOTCOM_HOST)
    }

    /// The mode set for a host: configuration wins, otherwise detection.
    /// github.com no longer accepts account passwords over Git transport,
    /// so dotcom gets the token-shaped modes only.
    async fn auth_modes(&self, host: &str) -> AuthModes {
        if let Some(configured) = self
            .context
            .settings
            .github_auth_modes()
            .as_deref()
            .and_then(AuthModes::parse)
        {
            return configured;
        }

        if Self::is_dotcom(host) {
            return AuthModes {
                basic: false,
                oauth: true,
                devcode: true,
                pat: true,
            };
        }

        // GHES: ask the instance whether password authentication works.
        // Probe failures degrade to the prompt-based modes rather than
        // failing the whole get.
        let basic = match self.probe_password_auth(host).await {
            Ok(supported) => supported,
            Err(e) => {
                tracing::debug!("meta probe for {host} failed: {e}");
                true
            }
        };
        AuthModes {
            basic,
            oauth: false,
            devcode: false,
            pat: true,
        }
    }

    async fn probe_password_auth(&self, host: &str) -> Result<bool> {
        let meta: MetaResponse = self
            .context
            .http
            .get(format!("https://{host}/api/v3/meta"))
            .header(reqwest::header::USER_AGENT, "credman")
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()
            .map_err(CoreError::Http)?
            .json()
            .await?;
        Ok(meta.verifiable_password_authentication)
    }

    fn oauth_client(&self, host: &str) -> OAuthClient {
        let endpoints = OAuthEndpoints {
            authorize: format!("https://{host}/login/oauth/authorize"),
            token: format!("https://{host}/login/oauth/access_token"),
            device: Some(format!("https://{host}/login/device/code")),
        };
        OAuthClient::new(
            self.context.http.clone(),
            endpoints,
            OAUTH_CLIENT_ID.to_string(),
        )
        .with_client_secret(OAUTH_CLIENT_SECRET)
    }

    /// Resolve the token's account login for a friendlier username; any
    /// API failure falls back to the conventional `oauth2`.
    async fn resolve_login(&self, host: &str, token: &str) -> String {
        let endpoint = if Self::is_dotcom(host) {
            "https://api.github.com/user".to_string()
        } else {
            format!("https://{host}/api/v3/user")
        };

        let fetched = self
            .context
            .http
            .get(endpoint)
            .header(reqwest::header::USER_AGENT, "credman")
            .header(reqwest::header::AUTHORIZATION, format!("token {token}"))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match fetched {
            Ok(response) => match response.json::<UserResponse>().await {
                Ok(user) => user.login,
                Err(e) => {
                    tracing::debug!("cannot parse user response: {e}");
                    "oauth2".to_string()
                }
            },
            Err(e) => {
                tracing::debug!("cannot resolve login: {e}");
                "oauth2".to_string()
            }
        }
    }

    async fn authenticate(&self, host: &str, request: &Request) -> Result<Credential> {
        if !self.context.settings.is_interactive()? {
            return Err(CoreError::InteractionDisabled);
        }

        let modes = self.auth_modes(host).await;
        tracing::debug!(?modes, host, "starting GitHub authentication");

        if modes.oauth && is_desktop_session() {
            let token = self
                .oauth_client(host)
                .authorization_code(
                    OAUTH_SCOPES,
                    None,
                    &SystemBrowser,
                    &self.context.cancel,
                )
                .await?;
            return Ok(self.credential_from_token(host, token).await);
        }

        if modes.devcode {
            let token = self
                .oauth_client(host)
                .device_code(
                    OAUTH_SCOPES,
                    self.context.prompter.as_ref(),
                    &self.context.cancel,
                )
                .await?;
            return Ok(self.credential_from_token(host, token).await);
        }

        // Prompt-based modes; offer a choice only when both remain.
        let use_pat = match (modes.pat, modes.basic) {
            (true, true) => {
                let items = vec![
                    "Personal access token".to_string(),
                    "Username and password".to_string(),
                ];
                self.context
                    .prompter
                    .prompt_select("Select an authentication method", &items)
                    .await?
                    == 0
            }
            (true, false) => true,
            (false, true) => false,
            (false, false) => {
                return Err(CoreError::AuthFailed(format!(
                    "no viable authentication method for {host}"
                )))
            }
        };

        if use_pat {
            let token = self
                .context
                .prompter
                .prompt_secret("Personal access token")
                .await?;
            let login = self.resolve_login(host, &token).await;
            Ok(Credential::new(login, token))
        } else {
            self.context
                .prompter
                .prompt_basic(&format!("https://{host}"), request.username())
                .await
        }
    }

    async fn credential_from_token(&self, host: &str, token: TokenResult) -> Credential {
        let login = self.resolve_login(host, &token.access_token).await;
        Credential::new(login, token.access_token)
    }
}

#[async_trait]
impl HostProvider for GitHubProvider {
    fn id(&self) -> &'static str {
        "github"
    }

    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn is_supported(&self, request: &Request) -> bool {
        matches!(request.host(), Ok(host) if Self::is_github_host(host))
    }

    async fn get_credential(&self, request: &Request) -> Result<Option<Credential>> {
        let remote = Self::normalized_remote(&request.remote_url()?);
        let service = service_for(&self.context, &remote)?;

        if let Some(stored) = self.context.store.get(&service, request.username())? {
            tracing::debug!(%service, "serving stored credential");
            return Ok(Some(stored));
        }

        let host = remote
            .host_str()
            .ok_or_else(|| CoreError::Internal("remote without host".into()))?
            .to_string();
        let credential = self.authenticate(&host, request).await?;
        Ok(Some(credential))
    }

    async fn store_credential(&self, request: &Request) -> Result<()> {
        let remote = Self::normalized_remote(&request.remote_url()?);
        store_credential_for(&self.context, request, &remote)
    }

    async fn erase_credential(&self, request: &Request) -> Result<()> {
        let remote = Self::normalized_remote(&request.remote_url()?);
        erase_credential_for(&self.context, request, &remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matching() {
        for host in [
            "github.com",
            "GitHub.com",
            "gist.github.com",
            "github.example.com",
            "gist.github.example.com",
            "github.com:443",
        ] {
            assert!(GitHubProvider::is_github_host(host), "{host}");
        }
        for host in [
            "example.com",
            "mygithub.com",
            "github",
            "gist.example.com",
            "gist.github",
        ] {
            assert!(!GitHubProvider::is_github_host(host), "{host}");
        }
    }

    #[test]
    fn test_gist_host_normalization() {
        let remote = Url::parse("https://gist.github.com/alice/abc123").unwrap();
        let normalized = GitHubProvider::normalized_remote(&remote);
        assert_eq!(normalized.host_str(), Some("github.com"));

        let remote = Url::parse("https://github.com/org/repo").unwrap();
        let normalized = GitHubProvider::normalized_remote(&remote);
        assert_eq!(normalized.host_str(), Some("github.com"));
    }

    #[test]
    fn test_auth_mode_parsing() {
        let modes = AuthModes::parse("oauth devcode").unwrap();
        assert!(modes.oauth && modes.devcode && !modes.basic && !modes.pat);

        let modes = AuthModes::parse("basic,pat").unwrap();
        assert!(modes.basic && modes.pat && !modes.oauth);

        // Unknown-only lists mean "nothing configured"
        assert_eq!(AuthModes::parse("kerberos"), None);
        assert_eq!(AuthModes::parse(""), None);
    }
}
