//! Error types for settings resolution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to invoke git: {0}")]
    GitInvocation(#[from] std::io::Error),

    #[error("git config exited with status {status}: {stderr}")]
    GitConfig { status: i32, stderr: String },

    #[error("git config produced non-UTF-8 output")]
    GitEncoding,

    #[error("Invalid value '{value}' for setting {name}")]
    InvalidValue { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
