//! Azure DevOps OAuth authority discovery
//!
//! An unauthenticated HEAD against the organization URL yields either a
//! `WWW-Authenticate: Bearer authorization_uri=<url>` challenge or one or
//! more `X-VSS-ResourceTenant` headers carrying tenant GUIDs. The first
//! `authorization_uri` wins; tenant headers are the fallback.

use credman_core::cancel::CancellationToken;
use credman_core::{CoreError, Result};
use url::Url;

pub const AUTHORITY_BASE: &str = "https://login.microsoftonline.com";

const WWW_AUTHENTICATE: &str = "www-authenticate";
const VSS_RESOURCE_TENANT: &str = "x-vss-resourcetenant";
const EMPTY_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Discover the OAuth authority for an organization URL.
pub async fn discover(
    http: &reqwest::Client,
    org_url: &Url,
    cancel: &CancellationToken,
) -> Result<String> {
    tracing::debug!(%org_url, "discovering OAuth authority");
    let request = http
        .head(org_url.clone())
        .timeout(std::time::Duration::from_secs(30));

    let response = tokio::select! {
        sent = request.send() => sent,
        _ = cancel.cancelled() => return Err(CoreError::Canceled),
    }
    .map_err(|e| {
        if e.is_timeout() {
            CoreError::Timeout
        } else {
            CoreError::Transient(format!("authority probe failed: {e}"))
        }
    })?;

    let headers = response.headers();
    let challenges: Vec<String> = headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    let tenants: Vec<String> = headers
        .get_all(VSS_RESOURCE_TENANT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    Ok(from_headers(&challenges, &tenants))
}

/// Resolve the authority from response headers.
///
/// The first `Bearer` challenge carrying an `authorization_uri` parameter
/// wins. Otherwise: the first non-empty tenant GUID scopes the authority to
/// that tenant; a single empty GUID means an AAD-backed organization with
/// no fixed tenant (`organizations`); anything else falls back to `common`
/// (covers MSA-backed organizations).
pub fn from_headers(www_authenticate: &[String], resource_tenants: &[String]) -> String {
    for challenge in www_authenticate {
        if let Some(uri) = authorization_uri(challenge) {
            return uri;
        }
    }

    let first_real_tenant = resource_tenants
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty() && !t.eq_ignore_ascii_case(EMPTY_GUID));
    if let Some(tenant) = first_real_tenant {
        return format!("{AUTHORITY_BASE}/{tenant}");
    }

    let empty_tenants = resource_tenants
        .iter()
        .filter(|t| {
            let t = t.trim();
            t.is_empty() || t.eq_ignore_ascii_case(EMPTY_GUID)
        })
        .count();
    if empty_tenants == 1 {
        return format!("{AUTHORITY_BASE}/organizations");
    }

    format!("{AUTHORITY_BASE}/common")
}

/// Extract `authorization_uri` from a `Bearer` challenge.
fn authorization_uri(challenge: &str) -> Option<String> {
    let rest = challenge.trim().strip_prefix("Bearer")?;
    for param in rest.split(',') {
        let param = param.trim();
        if let Some((name, value)) = param.split_once('=') {
            if name.trim().eq_ignore_ascii_case("authorization_uri") {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bearer_authorization_uri_wins() {
        let authority = from_headers(
            &strings(&["Bearer authorization_uri=https://login.microsoftonline.com/T1"]),
            &strings(&["11111111-2222-3333-4444-555555555555"]),
        );
        assert_eq!(authority, "https://login.microsoftonline.com/T1");
    }

    #[test]
    fn test_first_authorization_uri_wins_over_later_ones() {
        let authority = from_headers(
            &strings(&[
                "Basic realm=\"azure\"",
                "Bearer authorization_uri=https://login.microsoftonline.com/FIRST",
                "Bearer authorization_uri=https://login.microsoftonline.com/SECOND",
            ]),
            &[],
        );
        assert_eq!(authority, "https://login.microsoftonline.com/FIRST");
    }

    #[test]
    fn test_bearer_challenge_with_multiple_parameters() {
        let authority = from_headers(
            &strings(&[
                "Bearer realm=\"azure\", authorization_uri=\"https://login.microsoftonline.com/T2\"",
            ]),
            &[],
        );
        assert_eq!(authority, "https://login.microsoftonline.com/T2");
    }

    #[test]
    fn test_tenant_guid_fallback() {
        let authority = from_headers(
            &[],
            &strings(&["11111111-2222-3333-4444-555555555555"]),
        );
        assert_eq!(
            authority,
            "https://login.microsoftonline.com/11111111-2222-3333-4444-555555555555"
        );
    }

    #[test]
    fn test_first_nonempty_guid_wins() {
        let authority = from_headers(
            &[],
            &strings(&[
                "00000000-0000-0000-0000-000000000000",
                "11111111-2222-3333-4444-555555555555",
            ]),
        );
        assert_eq!(
            authority,
            "https://login.microsoftonline.com/11111111-2222-3333-4444-555555555555"
        );
    }

    #[test]
    fn test_single_empty_guid_means_organizations() {
        let authority = from_headers(&[], &strings(&["00000000-0000-0000-0000-000000000000"]));
        assert_eq!(authority, "https://login.microsoftonline.com/organizations");
    }

    #[test]
    fn test_no_headers_means_common() {
        assert_eq!(
            from_headers(&[], &[]),
            "https://login.microsoftonline.com/common"
        );
    }

    #[test]
    fn test_non_bearer_challenges_are_ignored() {
        let authority = from_headers(
            &strings(&["Basic realm=\"x\"", "Negotiate"]),
            &[],
        );
        assert_eq!(authority, "https://login.microsoftonline.com/common");
    }
}
