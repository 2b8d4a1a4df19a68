//! The credential model and service-key construction

use std::fmt;
use url::Url;

/// A secret value. The backing memory is zeroed when the value is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        // NUL is valid UTF-8, so overwriting in place keeps the String sound.
        unsafe { self.0.as_bytes_mut() }.fill(0);
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

/// A `(username, secret)` pair as handed to Git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    account: String,
    secret: Secret,
}

impl Credential {
    pub fn new(account: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            secret: Secret::new(secret),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn secret(&self) -> &str {
        self.secret.expose()
    }

    /// The empty credential: tells Git to let the transport negotiate
    /// authentication itself (Windows integrated auth).
    pub fn transport_negotiate() -> Self {
        Self::new("", "")
    }
}

/// Canonical form of a remote URL for use in storage keys.
///
/// Lowercases the scheme and host, strips query strings, fragments,
/// userinfo and default ports, and keeps the path only when the caller
/// requested path-scoped credentials.
pub fn canonical_url(url: &Url, use_http_path: bool) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    let mut out = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    if use_http_path {
        let path = url.path().trim_end_matches('/');
        if !path.is_empty() && path != "/" {
            out.push_str(path);
        }
    }
    out
}

/// The composite key a credential is filed under: `<namespace>:<canonical-url>`.
pub fn service_key(namespace: &str, url: &Url, use_http_path: bool) -> String {
    format!("{namespace}:{}", canonical_url(url, use_http_path))
}
