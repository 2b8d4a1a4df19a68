//! URL-scoped configuration matching
//!
//! Git configuration keys of the form `credential.<scope>.<property>`
//! restrict a setting to remotes matching `<scope>`. A scope is either a
//! bare host (`example.com`, `example.com:8080`) or a URL
//! (`https://example.com/some/path`). Host labels match suffix-style, so a
//! configured `visualstudio.com` applies to `microsoft.visualstudio.com`;
//! paths match as segment prefixes.

use url::Url;

/// A `section[.scope].property` key split into its parts.
///
/// The scope is everything between the first and the last dot and may
/// itself contain dots (hosts, URLs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey<'a> {
    pub section: &'a str,
    pub scope: Option<&'a str>,
    pub property: &'a str,
}

impl<'a> ConfigKey<'a> {
    pub fn parse(key: &'a str) -> Option<Self> {
        let (section, rest) = key.split_once('.')?;
        match rest.rsplit_once('.') {
            Some((scope, property)) => Some(Self {
                section,
                scope: Some(scope),
                property,
            }),
            None => Some(Self {
                section,
                scope: None,
                property: rest,
            }),
        }
    }
}

/// How specifically a scope matched a remote URL. Higher compares greater.
///
/// Path segments dominate, then host label count, then scheme presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    path_segments: usize,
    host_labels: usize,
    has_scheme: bool,
}

/// Test a configuration scope against a remote URL.
///
/// Returns the match specificity, or `None` when the scope does not apply.
pub fn scope_matches(scope: &str, remote: &Url) -> Option<Specificity> {
    let (scheme, rest) = match scope.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, scope),
    };

    if let Some(scheme) = scheme {
        if !scheme.eq_ignore_ascii_case(remote.scheme()) {
            return None;
        }
    }

    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, Some(path)),
        None => (rest, None),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host, port.parse::<u16>().ok())
        }
        _ => (authority, None),
    };

    if host.is_empty() || !host_matches(host, remote.host_str()?) {
        return None;
    }

    if let Some(port) = port {
        if remote.port_or_known_default() != Some(port) {
            return None;
        }
    }

    let path_segments = match path {
        Some(path) => {
            let segments = segment_count(path);
            if !path_matches(path, remote.path()) {
                return None;
            }
            segments
        }
        None => 0,
    };

    Some(Specificity {
        path_segments,
        host_labels: host.split('.').count(),
        has_scheme: scheme.is_some(),
    })
}

/// Suffix-style host label comparison, case-insensitive.
pub fn host_matches(config_host: &str, remote_host: &str) -> bool {
    let config_host = config_host.to_ascii_lowercase();
    let remote_host = remote_host.to_ascii_lowercase();
    remote_host == config_host || remote_host.ends_with(&format!(".{config_host}"))
}

/// Segment-wise path prefix comparison on canonicalized paths.
pub fn path_matches(config_path: &str, remote_path: &str) -> bool {
    let config: Vec<&str> = config_path.split('/').filter(|s| !s.is_empty()).collect();
    let remote: Vec<&str> = remote_path.split('/').filter(|s| !s.is_empty()).collect();
    config.len() <= remote.len() && config.iter().zip(&remote).all(|(a, b)| a == b)
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Parse a Git-style boolean setting value.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_config_key_parsing() {
        let key = ConfigKey::parse("credential.helper").unwrap();
        assert_eq!(key.section, "credential");
        assert_eq!(key.scope, None);
        assert_eq!(key.property, "helper");

        let key = ConfigKey::parse("credential.https://example.com/a.provider").unwrap();
        assert_eq!(key.scope, Some("https://example.com/a"));
        assert_eq!(key.property, "provider");

        assert_eq!(ConfigKey::parse("nodots"), None);
    }

    #[test]
    fn test_bare_host_scope() {
        let r = remote("https://example.com/repo.git");
        assert!(scope_matches("example.com", &r).is_some());
        assert!(scope_matches("other.com", &r).is_none());
    }

    #[test]
    fn test_host_suffix_matching() {
        let r = remote("https://microsoft.visualstudio.com/project");
        assert!(scope_matches("visualstudio.com", &r).is_some());
        assert!(scope_matches("microsoft.visualstudio.com", &r).is_some());
        // Label boundary: no partial-label matches
        assert!(scope_matches("studio.com", &r).is_none());
    }

    #[test]
    fn test_host_matching_is_case_insensitive() {
        let r = remote("https://github.com/org/repo");
        assert!(scope_matches("GitHub.com", &r).is_some());
    }

    #[test]
    fn test_scheme_must_match_when_present() {
        let r = remote("https://example.com/");
        assert!(scope_matches("https://example.com", &r).is_some());
        assert!(scope_matches("http://example.com", &r).is_none());
    }

    #[test]
    fn test_port_must_match_when_present() {
        let r = remote("https://example.com:8443/repo");
        assert!(scope_matches("example.com:8443", &r).is_some());
        assert!(scope_matches("example.com:9000", &r).is_none());
        // Default port is implied
        let r = remote("https://example.com/repo");
        assert!(scope_matches("example.com:443", &r).is_some());
    }

    #[test]
    fn test_path_prefix_matching() {
        let r = remote("https://dev.azure.com/contoso/_git/widgets");
        assert!(scope_matches("https://dev.azure.com/contoso", &r).is_some());
        assert!(scope_matches("dev.azure.com/contoso/_git", &r).is_some());
        assert!(scope_matches("dev.azure.com/fabrikam", &r).is_none());
        // Segment boundary: "cont" is not a prefix of "contoso"
        assert!(scope_matches("dev.azure.com/cont", &r).is_none());
    }

    #[test]
    fn test_specificity_ordering() {
        let r = remote("https://dev.azure.com/contoso/_git/widgets");
        let by_host = scope_matches("azure.com", &r).unwrap();
        let by_full_host = scope_matches("dev.azure.com", &r).unwrap();
        let by_path = scope_matches("dev.azure.com/contoso", &r).unwrap();
        let by_scheme_path = scope_matches("https://dev.azure.com/contoso", &r).unwrap();
        assert!(by_full_host > by_host);
        assert!(by_path > by_full_host);
        assert!(by_scheme_path > by_path);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["1", "true", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["0", "false", "No", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
