//! Environment variable bindings for settings
//!
//! Each `credential.<property>` setting may be overridden by a `GCM_*`
//! environment variable. Variables take precedence over any Git
//! configuration.

/// Well-known property names under the `credential` section.
pub mod props {
    pub const INTERACTIVE: &str = "interactive";
    pub const PROVIDER: &str = "provider";
    /// Deprecated alias for [`PROVIDER`].
    pub const AUTHORITY: &str = "authority";
    pub const ALLOW_WINDOWS_AUTH: &str = "allowWindowsAuth";
    pub const HTTP_PROXY: &str = "httpProxy";
    pub const GITHUB_AUTH_MODES: &str = "gitHubAuthModes";
    pub const NAMESPACE: &str = "namespace";
    pub const CREDENTIAL_STORE: &str = "credentialStore";
    pub const PLAINTEXT_STORE_PATH: &str = "plaintextStorePath";
    pub const MSAUTH_FLOW: &str = "msauthFlow";
    pub const USE_HTTP_PATH: &str = "useHttpPath";
    pub const AZREPOS_CREDENTIAL_TYPE: &str = "azreposCredentialType";
    pub const TRACE: &str = "trace";
    pub const TRACE_SECRETS: &str = "traceSecrets";
}

/// Property-to-variable bindings, compared case-insensitively because Git
/// lowercases property names in its config listings.
const VARIABLES: &[(&str, &str)] = &[
    (props::INTERACTIVE, "GCM_INTERACTIVE"),
    (props::PROVIDER, "GCM_PROVIDER"),
    (props::AUTHORITY, "GCM_AUTHORITY"),
    (props::ALLOW_WINDOWS_AUTH, "GCM_ALLOW_WINDOWSAUTH"),
    (props::HTTP_PROXY, "GCM_HTTP_PROXY"),
    (props::GITHUB_AUTH_MODES, "GCM_GITHUB_AUTHMODES"),
    (props::NAMESPACE, "GCM_NAMESPACE"),
    (props::CREDENTIAL_STORE, "GCM_CREDENTIAL_STORE"),
    (props::PLAINTEXT_STORE_PATH, "GCM_PLAINTEXT_STORE_PATH"),
    (props::MSAUTH_FLOW, "GCM_MSAUTH_FLOW"),
    (props::TRACE, "GCM_TRACE"),
    (props::TRACE_SECRETS, "GCM_TRACE_SECRETS"),
];

/// Environment variable registered for a `credential.<property>` setting,
/// or `None` when the property has no variable binding.
pub fn variable_for(property: &str) -> Option<&'static str> {
    VARIABLES
        .iter()
        .find(|(prop, _)| prop.eq_ignore_ascii_case(property))
        .map(|(_, var)| *var)
}

/// Whether the variable is kept only for backwards compatibility.
pub fn is_deprecated_variable(var: &str) -> bool {
    matches!(var, "GCM_AUTHORITY" | "GCM_HTTP_PROXY")
}
