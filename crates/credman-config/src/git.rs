//! Git configuration access
//!
//! Configuration entries are read once per process with
//! `git config --list --null` and kept in definition order. Git emits
//! entries from system, global and local files in that order, so a later
//! entry always reflects a more recently applied value.

use crate::{ConfigError, Result};
use std::process::Command;

/// A source of Git configuration entries.
///
/// The trait exists so tests can substitute an in-memory source for the
/// `git` child process.
pub trait ConfigSource: Send + Sync {
    /// All `(key, value)` entries in definition order.
    fn entries(&self) -> &[(String, String)];
}

/// Configuration loaded from the `git` binary.
pub struct GitConfigSource {
    entries: Vec<(String, String)>,
}

impl GitConfigSource {
    /// Read the full configuration visible from the current directory.
    pub fn load() -> Result<Self> {
        let output = Command::new("git")
            .args(["config", "--list", "--null"])
            .output()?;

        if !output.status.success() {
            return Err(ConfigError::GitConfig {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = String::from_utf8(output.stdout).map_err(|_| ConfigError::GitEncoding)?;
        Ok(Self {
            entries: parse_null_terminated(&raw),
        })
    }
}

impl ConfigSource for GitConfigSource {
    fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// In-memory configuration source for tests.
#[derive(Default)]
pub struct MemoryConfigSource {
    entries: Vec<(String, String)>,
}

impl MemoryConfigSource {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
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
}

impl ConfigSource for MemoryConfigSource {
    fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// Parse `git config --list --null` output.
///
/// Entries are NUL-separated; within an entry the key is separated from the
/// value by the first newline. An entry without a newline is a key set with
/// no value (boolean shorthand), reported with an empty value.
fn parse_null_terminated(raw: &str) -> Vec<(String, String)> {
    raw.split('\0')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('\n') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}
