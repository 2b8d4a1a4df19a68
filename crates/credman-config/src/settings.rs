//! The scoped settings resolver

use crate::{
    environment, parse_bool, scope_matches, ConfigError, ConfigKey, ConfigSource, Result,
    Specificity,
};
use std::collections::HashMap;
use url::Url;

const SECTION: &str = "credential";

/// Resolves `credential.<property>` settings against the environment and
/// Git configuration, scoped to the remote URL of the current request.
pub struct Settings {
    source: Box<dyn ConfigSource>,
    environment: HashMap<String, String>,
    remote: Option<Url>,
}

impl Settings {
    /// Build a resolver over the given configuration source, capturing the
    /// process environment.
    pub fn new(source: Box<dyn ConfigSource>) -> Self {
        Self::with_environment(source, std::env::vars().collect())
    }

    /// Build a resolver with an explicit environment map. Used by tests.
    pub fn with_environment(
        source: Box<dyn ConfigSource>,
        environment: HashMap<String, String>,
    ) -> Self {
        Self {
            source,
            environment,
            remote: None,
        }
    }

    /// Scope subsequent lookups to the remote URL of the current request.
    pub fn set_remote(&mut self, remote: Url) {
        self.remote = Some(remote);
    }

    pub fn remote(&self) -> Option<&Url> {
        self.remote.as_ref()
    }

    /// Resolve `credential.<property>`.
    ///
    /// Precedence: registered environment variable, then the most specific
    /// matching Git configuration entry (ties favor the later entry), then
    /// `None`.
    pub fn get(&self, property: &str) -> Option<String> {
        if let Some(var) = environment::variable_for(property) {
            if let Some(value) = self.environment.get(var) {
                if environment::is_deprecated_variable(var) {
                    tracing::warn!("{var} is deprecated and will be removed in a future release");
                }
                return Some(value.clone());
            }
        }

        self.get_from_git(property)
    }

    /// Resolve a boolean setting (`1|true|yes|on` / `0|false|no|off`).
    pub fn get_bool(&self, property: &str) -> Result<Option<bool>> {
        match self.get(property) {
            None => Ok(None),
            Some(value) => match parse_bool(&value) {
                Some(b) => Ok(Some(b)),
                None => Err(ConfigError::InvalidValue {
                    name: format!("{SECTION}.{property}"),
                    value,
                }),
            },
        }
    }

    fn get_from_git(&self, property: &str) -> Option<String> {
        // (specificity, entry index) of the best match so far; unscoped
        // entries rank below every scoped match.
        let mut best: Option<(Option<Specificity>, usize, &str)> = None;

        for (index, (key, value)) in self.source.entries().iter().enumerate() {
            let Some(parsed) = ConfigKey::parse(key) else {
                continue;
            };
            if !parsed.section.eq_ignore_ascii_case(SECTION)
                || !parsed.property.eq_ignore_ascii_case(property)
            {
                continue;
            }

            let specificity = match parsed.scope {
                None => None,
                Some(scope) => match self.remote.as_ref().and_then(|r| scope_matches(scope, r)) {
                    Some(s) => Some(s),
                    None => continue,
                },
            };

            // Later entries win ties: git lists system -> global -> local
            let better = match &best {
                None => true,
                Some((current, _, _)) => specificity >= *current,
            };
            if better {
                best = Some((specificity, index, value));
            }
        }

        best.map(|(_, _, value)| value.to_string())
    }

    // Convenience accessors for well-known settings.

    /// Whether interactive prompts are allowed. Defaults to true.
    pub fn is_interactive(&self) -> Result<bool> {
        Ok(self
            .get_bool(environment::props::INTERACTIVE)?
            .unwrap_or(true))
    }

    /// A forced provider id, if configured. `credential.authority` is
    /// honored as a deprecated alias.
    pub fn provider_override(&self) -> Option<String> {
        self.get(environment::props::PROVIDER).or_else(|| {
            let value = self.get(environment::props::AUTHORITY)?;
            tracing::warn!(
                "credential.authority is deprecated; use credential.provider instead"
            );
            Some(value)
        })
    }

    pub fn allow_windows_auth(&self) -> Result<bool> {
        Ok(self
            .get_bool(environment::props::ALLOW_WINDOWS_AUTH)?
            .unwrap_or(false))
    }

    pub fn use_http_path(&self) -> Result<bool> {
        Ok(self
            .get_bool(environment::props::USE_HTTP_PATH)?
            .unwrap_or(false))
    }

    /// Credential store key prefix. Defaults to `git`.
    pub fn namespace(&self) -> String {
        self.get(environment::props::NAMESPACE)
            .unwrap_or_else(|| "git".to_string())
    }

    pub fn credential_store(&self) -> Option<String> {
        self.get(environment::props::CREDENTIAL_STORE)
    }

    pub fn plaintext_store_path(&self) -> Option<String> {
        self.get(environment::props::PLAINTEXT_STORE_PATH)
    }

    pub fn github_auth_modes(&self) -> Option<String> {
        self.get(environment::props::GITHUB_AUTH_MODES)
    }

    pub fn msauth_flow(&self) -> Option<String> {
        self.get(environment::props::MSAUTH_FLOW)
    }

    pub fn azrepos_credential_type(&self) -> Option<String> {
        self.get(environment::props::AZREPOS_CREDENTIAL_TYPE)
    }

    pub fn http_proxy(&self) -> Option<String> {
        self.get(environment::props::HTTP_PROXY)
    }

    pub fn trace_secrets(&self) -> bool {
        self.get(environment::props::TRACE_SECRETS)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryConfigSource;

    fn settings(entries: Vec<(&str, &str)>, env: Vec<(&str, &str)>) -> Settings {
        Settings::with_environment(
            Box::new(MemoryConfigSource::new(entries)),
            env.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_environment_beats_git_config() {
        let mut s = settings(
            vec![("credential.provider", "github")],
            vec![("GCM_PROVIDER", "azure-repos")],
        );
        s.set_remote(Url::parse("https://example.com/").unwrap());
        assert_eq!(s.get("provider").as_deref(), Some("azure-repos"));
    }

    #[test]
    fn test_unscoped_lookup() {
        let s = settings(vec![("credential.namespace", "work")], vec![]);
        assert_eq!(s.namespace(), "work");
    }

    #[test]
    fn test_scoped_entry_beats_unscoped() {
        let mut s = settings(
            vec![
                ("credential.provider", "generic"),
                ("credential.github.com.provider", "github"),
            ],
            vec![],
        );
        s.set_remote(Url::parse("https://github.com/org/repo").unwrap());
        assert_eq!(s.get("provider").as_deref(), Some("github"));
    }

    #[test]
    fn test_most_specific_scope_wins_regardless_of_order() {
        let mut s = settings(
            vec![
                ("credential.https://dev.azure.com/contoso.provider", "azure-repos"),
                ("credential.azure.com.provider", "generic"),
            ],
            vec![],
        );
        s.set_remote(Url::parse("https://dev.azure.com/contoso/_git/w").unwrap());
        assert_eq!(s.get("provider").as_deref(), Some("azure-repos"));
    }

    #[test]
    fn test_ties_favor_later_entry() {
        let mut s = settings(
            vec![
                ("credential.github.com.provider", "first"),
                ("credential.github.com.provider", "second"),
            ],
            vec![],
        );
        s.set_remote(Url::parse("https://github.com/").unwrap());
        assert_eq!(s.get("provider").as_deref(), Some("second"));
    }

    #[test]
    fn test_scoped_entry_ignored_without_remote() {
        let s = settings(vec![("credential.github.com.provider", "github")], vec![]);
        assert_eq!(s.get("provider"), None);
    }

    #[test]
    fn test_parent_domain_scope_applies() {
        let mut s = settings(
            vec![("credential.visualstudio.com.namespace", "vs")],
            vec![],
        );
        s.set_remote(Url::parse("https://contoso.visualstudio.com/p").unwrap());
        assert_eq!(s.namespace(), "vs");
    }

    #[test]
    fn test_authority_aliases_provider() {
        let s = settings(vec![], vec![("GCM_AUTHORITY", "github")]);
        assert_eq!(s.provider_override().as_deref(), Some("github"));

        let s = settings(vec![], vec![("GCM_PROVIDER", "azure-repos"), ("GCM_AUTHORITY", "github")]);
        assert_eq!(s.provider_override().as_deref(), Some("azure-repos"));
    }

    #[test]
    fn test_bool_parsing_and_defaults() {
        let s = settings(vec![], vec![("GCM_INTERACTIVE", "0")]);
        assert!(!s.is_interactive().unwrap());

        let s = settings(vec![], vec![]);
        assert!(s.is_interactive().unwrap());
        assert!(!s.allow_windows_auth().unwrap());
    }

    #[test]
    fn test_invalid_bool_is_an_error() {
        let s = settings(vec![("credential.interactive", "banana")], vec![]);
        assert!(s.is_interactive().is_err());
    }

    #[test]
    fn test_property_lookup_matches_lowercased_git_keys() {
        // git lowercases section and property names in its output
        let s = settings(vec![("credential.githubauthmodes", "oauth basic")], vec![]);
        assert_eq!(s.github_auth_modes().as_deref(), Some("oauth basic"));
    }
}
