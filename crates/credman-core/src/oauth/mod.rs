//! OAuth 2.0 client
//!
//! Three flows: authorization-code with PKCE over a loopback redirect,
//! device-code with polling, and refresh-token exchange. Each flow is
//! single-shot; the in-flight state (verifier, state nonce, redirect URI)
//! is dropped as soon as a token or a terminal error is produced.

mod browser;
mod listener;
pub mod pkce;

pub use browser::*;
pub use listener::RedirectListener;

use crate::cancel::CancellationToken;
use crate::{CoreError, Prompter, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Per-request HTTP deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Outer deadline for the interactive authorization-code flow.
const AUTH_CODE_DEADLINE: Duration = Duration::from_secs(600);
/// Transient failures are retried this many times with exponential backoff.
const RETRY_ATTEMPTS: u32 = 3;

/// Endpoint set for one authorization server.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize: String,
    pub token: String,
    /// Absent when the server does not offer the device-code grant.
    pub device: Option<String>,
}

/// The outcome of a successful token request.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub id_token: Option<String>,
    /// Account identifier derived from the id token, e.g. a UPN.
    pub account: Option<String>,
}

/// Refresh either produces a new token or reports that the refresh token is
/// dead and the caller must fall back to an interactive flow.
#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed(TokenResult),
    Rejected,
}

pub struct OAuthClient {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
    client_id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    /// Some servers call this `verification_url`.
    #[serde(alias = "verification_url")]
    verification_uri: String,
    expires_in: i64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, endpoints: OAuthEndpoints, client_id: String) -> Self {
        Self {
            http,
            endpoints,
            client_id,
            client_secret: None,
        }
    }

    /// Some servers (GitHub) require the app's client secret alongside the
    /// authorization code even for native apps.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Authorization-code flow with PKCE over the system browser.
    pub async fn authorization_code(
        &self,
        scopes: &[&str],
        login_hint: Option<&str>,
        browser: &dyn BrowserLauncher,
        cancel: &CancellationToken,
    ) -> Result<TokenResult> {
        let listener = RedirectListener::bind().await?;
        let redirect_uri = listener.redirect_uri();
        let pkce = pkce::generate_pair();
        let state = pkce::random_token(32);
        let nonce = pkce::random_token(32);

        let mut authorize = Url::parse(&self.endpoints.authorize)
            .map_err(|e| CoreError::Internal(format!("bad authorization endpoint: {e}")))?;
        {
            let mut query = authorize.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &redirect_uri)
                .append_pair("scope", &scopes.join(" "))
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
        }

        browser.open(authorize.as_str())?;
        tracing::info!("waiting for browser authorization");

        let code = match tokio::time::timeout(
            AUTH_CODE_DEADLINE,
            listener.wait_for_code(&state, cancel),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(CoreError::Timeout),
        };

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.client_id.clone()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", pkce.verifier),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.post_form(&self.endpoints.token, &form, cancel).await?;
        into_token_result(response)
    }

    /// Device-code flow: initiate, show the code, poll until completion.
    pub async fn device_code(
        &self,
        scopes: &[&str],
        prompter: &dyn Prompter,
        cancel: &CancellationToken,
    ) -> Result<TokenResult> {
        let endpoint = self.endpoints.device.as_deref().ok_or_else(|| {
            CoreError::Internal("authorization server offers no device-code endpoint".into())
        })?;

        let form = vec![
            ("client_id", self.client_id.clone()),
            ("scope", scopes.join(" ")),
        ];
        let initiation: DeviceCodeResponse = self
            .send_form(endpoint, &form, cancel)
            .await?
            .json()
            .await?;

        prompter
            .show_device_code(&initiation.user_code, &initiation.verification_uri)
            .await?;

        let deadline = Utc::now() + ChronoDuration::seconds(initiation.expires_in);
        let mut interval = initiation.interval.max(1);

        loop {
            if Utc::now() >= deadline {
                return Err(CoreError::Timeout);
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = cancel.cancelled() => return Err(CoreError::Canceled),
            }

            let mut form = vec![
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code".to_string()),
                ("device_code", initiation.device_code.clone()),
                ("client_id", self.client_id.clone()),
            ];
            if let Some(secret) = &self.client_secret {
                form.push(("client_secret", secret.clone()));
            }

            let response = self.post_form(&self.endpoints.token, &form, cancel).await?;
            match response.error.as_deref() {
                Some("authorization_pending") => continue,
                Some("slow_down") => {
                    interval += 5;
                    continue;
                }
                Some("expired_token") => {
                    return Err(CoreError::AuthFailed("the device code has expired".into()))
                }
                Some("access_denied") => {
                    return Err(CoreError::AuthFailed("authorization was denied".into()))
                }
                _ => return into_token_result(response),
            }
        }
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
        ];
        if !scopes.is_empty() {
            form.push(("scope", scopes.join(" ")));
        }
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.send_form(&self.endpoints.token, &form, cancel).await?;
        let status = response.status();
        if status.is_client_error() {
            // The refresh token is dead; interactive sign-in is required
            tracing::debug!(%status, "refresh token rejected");
            return Ok(RefreshOutcome::Rejected);
        }
        let body: TokenResponse = response.json().await?;
        if body.error.is_some() {
            return Ok(RefreshOutcome::Rejected);
        }
        into_token_result(body).map(RefreshOutcome::Refreshed)
    }

    /// POST a form and parse the token-shaped JSON body. OAuth servers
    /// report grant errors with 4xx statuses and an `error` field, so client
    /// errors are parsed rather than failed.
    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let response = self.send_form(endpoint, form, cancel).await?;
        Ok(response.json().await?)
    }

    /// POST with retry: transient failures (connect errors, timeouts, 5xx)
    /// are retried with exponential backoff before surfacing as
    /// [`CoreError::Transient`].
    async fn send_form(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut backoff = Duration::from_secs(1);
        let mut last_error = String::new();

        for attempt in 1..=RETRY_ATTEMPTS {
            if attempt > 1 {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return Err(CoreError::Canceled),
                }
                backoff *= 2;
            }

            let request = self
                .http
                .post(endpoint)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(form)
                .timeout(HTTP_TIMEOUT);

            let outcome = tokio::select! {
                sent = request.send() => sent,
                _ = cancel.cancelled() => return Err(CoreError::Canceled),
            };

            match outcome {
                Ok(response) if response.status().is_server_error() => {
                    last_error = format!("{} from {endpoint}", response.status());
                    tracing::debug!(attempt, "retrying after server error: {last_error}");
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => return Err(CoreError::Timeout),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(attempt, "retrying after network error: {last_error}");
                }
            }
        }

        Err(CoreError::Transient(last_error))
    }
}

fn into_token_result(response: TokenResponse) -> Result<TokenResult> {
    if let Some(error) = response.error {
        return Err(CoreError::AuthFailed(
            response.error_description.unwrap_or(error),
        ));
    }
    let access_token = response
        .access_token
        .ok_or_else(|| CoreError::AuthFailed("token response carried no access token".into()))?;

    let account = response.id_token.as_deref().and_then(account_from_id_token);
    Ok(TokenResult {
        access_token,
        refresh_token: response.refresh_token,
        expires_at: response
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        id_token: response.id_token,
        account,
    })
}

/// Pull an account identifier out of an id token without verifying it; the
/// token came straight from the issuer over TLS and is only used as a
/// display/storage hint.
pub fn account_from_id_token(id_token: &str) -> Option<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = id_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

    for claim in ["upn", "preferred_username", "email"] {
        if let Some(value) = claims.get(claim).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn fake_id_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.")
    }

    #[test]
    fn test_account_prefers_upn() {
        let token = fake_id_token(serde_json::json!({
            "upn": "alice@contoso.com",
            "preferred_username": "other@contoso.com",
        }));
        assert_eq!(
            account_from_id_token(&token).as_deref(),
            Some("alice@contoso.com")
        );
    }

    #[test]
    fn test_account_falls_back_to_preferred_username() {
        let token = fake_id_token(serde_json::json!({
            "preferred_username": "bob@fabrikam.com",
        }));
        assert_eq!(
            account_from_id_token(&token).as_deref(),
            Some("bob@fabrikam.com")
        );
    }

    #[test]
    fn test_account_from_garbage_is_none() {
        assert_eq!(account_from_id_token("not-a-jwt"), None);
        assert_eq!(account_from_id_token("a.b.c"), None);
    }

    #[test]
    fn test_token_result_maps_error_to_auth_failed() {
        let response = TokenResponse {
            access_token: None,
            expires_in: None,
            refresh_token: None,
            id_token: None,
            error: Some("invalid_grant".into()),
            error_description: Some("the grant is no good".into()),
        };
        let err = into_token_result(response).unwrap_err();
        assert!(matches!(err, CoreError::AuthFailed(ref m) if m == "the grant is no good"));
    }

    #[test]
    fn test_token_result_requires_access_token() {
        let response = TokenResponse {
            access_token: None,
            expires_in: None,
            refresh_token: None,
            id_token: None,
            error: None,
            error_description: None,
        };
        assert!(matches!(
            into_token_result(response),
            Err(CoreError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_token_result_computes_expiry() {
        let response = TokenResponse {
            access_token: Some("tok".into()),
            expires_in: Some(3600),
            refresh_token: Some("refresh".into()),
            id_token: None,
            error: None,
            error_description: None,
        };
        let result = into_token_result(response).unwrap();
        let expires = result.expires_at.unwrap();
        let delta = expires - Utc::now();
        assert!(delta.num_seconds() > 3500 && delta.num_seconds() <= 3600);
        assert_eq!(result.refresh_token.as_deref(), Some("refresh"));
    }
}
