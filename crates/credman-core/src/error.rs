//! Error types for credman-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed credential request: {0}")]
    MalformedInput(String),

    /// Carries the full user-visible message, e.g. the unencrypted-HTTP
    /// rejection for Azure Repos.
    #[error("{0}")]
    UnsupportedProtocol(String),

    #[error("No credential provider supports this request")]
    NoProvider,

    #[error("Unknown credential provider '{0}'")]
    UnknownProvider(String),

    #[error("Cannot prompt for credentials: interactivity has been disabled")]
    InteractionDisabled,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Operation was canceled")]
    Canceled,

    #[error("Timed out waiting for authentication")]
    Timeout,

    #[error("OAuth redirect returned a mismatched state value")]
    StateMismatch,

    #[error("Transient network failure: {0}")]
    Transient(String),

    #[error("Store file is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(#[from] credman_config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Exit code the helper process should report for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::Canceled => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
