//! The Git credential-helper wire protocol
//!
//! Git speaks a line-oriented `key=value` dictionary over the helper's
//! standard streams. Lines are LF-terminated (a trailing CR is tolerated on
//! key/value lines), and the dictionary ends at end-of-stream or at the
//! first empty line. Lines without a `=` are dropped silently so that
//! future Git extensions do not break older helpers.

use crate::{CoreError, Credential, Result};
use std::io::{BufRead, Write};
use url::Url;

/// Repeated attribute carrying WWW-Authenticate challenges from Git.
pub const WWW_AUTH_KEY: &str = "wwwauth[]";

/// A parsed credential request, immutable once read.
///
/// Attribute keys are case-insensitive on lookup; the original key text and
/// the entry order are preserved, including unrecognized attributes.
#[derive(Debug, Clone, Default)]
pub struct Request {
    entries: Vec<(String, String)>,
}

impl Request {
    /// Build a request directly from attribute pairs. Used by tests and by
    /// callers that synthesize requests.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Last value for an attribute, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a repeated attribute, in input order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn protocol(&self) -> Result<&str> {
        self.get("protocol")
            .ok_or_else(|| CoreError::MalformedInput("missing 'protocol' attribute".into()))
    }

    /// Host, possibly carrying a `:port` suffix.
    pub fn host(&self) -> Result<&str> {
        self.get("host")
            .ok_or_else(|| CoreError::MalformedInput("missing 'host' attribute".into()))
    }

    pub fn path(&self) -> Option<&str> {
        self.get("path")
    }

    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    pub fn www_auth(&self) -> Vec<&str> {
        self.get_all(WWW_AUTH_KEY)
    }

    /// The remote URL this request refers to.
    pub fn remote_url(&self) -> Result<Url> {
        let protocol = self.protocol()?;
        if !matches!(protocol, "http" | "https") {
            return Err(CoreError::MalformedInput(format!(
                "unsupported protocol '{protocol}'"
            )));
        }
        let host = self.host()?;
        let mut raw = format!("{protocol}://{host}/");
        if let Some(path) = self.path() {
            raw.push_str(path.trim_start_matches('/'));
        }
        Url::parse(&raw)
            .map_err(|e| CoreError::MalformedInput(format!("invalid remote URL '{raw}': {e}")))
    }
}

/// Read a request dictionary from a credential-helper input stream.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Request> {
    let mut entries = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            // Clean EOF at a line boundary ends the dictionary.
            break;
        }

        if buf.contains(&0) {
            return Err(CoreError::MalformedInput(
                "request contains a null byte".into(),
            ));
        }

        let terminated = buf.last() == Some(&b'\n');
        if terminated {
            buf.pop();
        } else {
            return Err(CoreError::MalformedInput(
                "unexpected end of input mid-line".into(),
            ));
        }

        // A truly empty line terminates the dictionary. A line holding only
        // a CR is not a terminator: the protocol is LF-delimited, and the CR
        // is stripped below as ordinary line content.
        if buf.is_empty() {
            break;
        }

        let mut line = std::str::from_utf8(&buf)
            .map_err(|_| CoreError::MalformedInput("request is not valid UTF-8".into()))?;
        line = line.strip_suffix('\r').unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            entries.push((key.to_string(), value.to_string()));
        } else {
            tracing::debug!("dropping attribute line without '='");
        }
    }

    Ok(Request { entries })
}

/// Write a credential response for a `get` request and flush.
///
/// Echoes `protocol` and `host`, plus `path` when the request carried one,
/// then the credential itself, then the blank-line terminator.
pub fn write_response<W: Write>(
    writer: &mut W,
    request: &Request,
    credential: &Credential,
) -> Result<()> {
    writeln!(writer, "protocol={}", request.protocol()?)?;
    writeln!(writer, "host={}", request.host()?)?;
    if let Some(path) = request.path() {
        writeln!(writer, "path={path}")?;
    }
    writeln!(writer, "username={}", credential.account())?;
    writeln!(writer, "password={}", credential.secret())?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
