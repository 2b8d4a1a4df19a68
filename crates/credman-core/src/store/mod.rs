//! Credential storage
//!
//! [`SecretStore`] is the facade every provider files credentials through.
//! The file-backed stores implemented here (`plaintext`, `gpg`) live
//! entirely in this crate; OS secret stores (keychain, Secret Service, the
//! Windows credential manager) are external drivers that plug in through
//! the same trait and are only named by the backend selector.

pub mod ini;
mod memory;
mod pass;
mod plaintext;

pub use ini::IniStore;
pub use memory::MemoryStore;
pub use pass::PassStore;
pub use plaintext::PlaintextStore;

use crate::{CoreError, Credential, Result};
use std::path::PathBuf;

/// A keyed secret store. `service` is a `<namespace>:<canonical-url>`
/// composite key; `account` is the username the secret belongs to.
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Look up a credential. With `account = None`, any credential filed
    /// under the service matches.
    fn get(&self, service: &str, account: Option<&str>) -> Result<Option<Credential>>;

    /// All `(service, account)` keys whose service starts with the prefix.
    fn list(&self, service_prefix: &str) -> Result<Vec<(String, String)>>;

    /// Insert or replace the credential for `(service, credential.account)`.
    fn add_or_update(&self, service: &str, credential: &Credential) -> Result<()>;

    /// Remove by full key. Returns whether an entry existed.
    fn remove(&self, service: &str, account: &str) -> Result<bool>;
}

/// Backends selectable via `credential.credentialStore` / `GCM_CREDENTIAL_STORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Plaintext,
    Gpg,
    Memory,
    Keychain,
    SecretService,
    WindowsCredentialManager,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plaintext" => Some(Self::Plaintext),
            "gpg" => Some(Self::Gpg),
            "memory" | "none" => Some(Self::Memory),
            "keychain" => Some(Self::Keychain),
            "secretservice" => Some(Self::SecretService),
            "wincredman" => Some(Self::WindowsCredentialManager),
            _ => None,
        }
    }
}

/// Options consumed by [`create_store`].
pub struct StoreOptions {
    /// Raw backend selector; `None` means nothing was configured.
    pub backend: Option<String>,
    /// `credential.plaintextStorePath`, before shell expansion.
    pub plaintext_path: Option<String>,
}

/// Create the process-wide secret store from configuration.
///
/// There is deliberately no default backend: storing secrets in plaintext
/// must be an explicit decision, and OS stores are provided by external
/// drivers. An unset selector is an error with guidance.
pub fn create_store(options: &StoreOptions) -> Result<Box<dyn SecretStore>> {
    let selector = options.backend.as_deref().ok_or_else(|| {
        CoreError::Store(
            "No credential store has been selected. \
             Set GCM_CREDENTIAL_STORE or credential.credentialStore to one of: \
             keychain, secretservice, wincredman, gpg, plaintext, memory"
                .into(),
        )
    })?;

    let backend = StoreBackend::parse(selector)
        .ok_or_else(|| CoreError::Store(format!("Unknown credential store '{selector}'")))?;

    match backend {
        StoreBackend::Plaintext => {
            let root = plaintext_root(options.plaintext_path.as_deref())?;
            tracing::warn!(
                path = %root.display(),
                "storing credentials unencrypted; this is not recommended"
            );
            Ok(Box::new(PlaintextStore::new(root)))
        }
        StoreBackend::Gpg => Ok(Box::new(PassStore::from_environment())),
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Keychain
        | StoreBackend::SecretService
        | StoreBackend::WindowsCredentialManager => Err(CoreError::Store(format!(
            "Credential store '{selector}' is not available in this build; \
             install the platform driver or select gpg or plaintext"
        ))),
    }
}

fn plaintext_root(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = configured {
        let expanded = shellexpand::tilde(path);
        return Ok(PathBuf::from(expanded.as_ref()));
    }
    let dirs = directories::ProjectDirs::from("", "", "credman")
        .ok_or_else(|| CoreError::Store("cannot determine user data directory".into()))?;
    Ok(dirs.data_dir().join("store"))
}
