//! `pass` (GPG) backed secret store
//!
//! Secrets are encrypted at rest by delegating to the standard Unix
//! password manager: `pass insert`/`pass show`/`pass rm`. Entry names are
//! visible in the password-store directory, so listing scans the
//! filesystem while reads and writes go through the `pass` binary.

use super::plaintext::{decode_component, encode_component};
use super::SecretStore;
use crate::{CoreError, Credential, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const ENTRY_PREFIX: &str = "credman";

#[derive(Debug)]
pub struct PassStore {
    store_dir: PathBuf,
}

impl PassStore {
    /// Locate the password store the way `pass` itself does.
    pub fn from_environment() -> Self {
        let store_dir = std::env::var_os("PASSWORD_STORE_DIR")
            .map(PathBuf::from)
            .or_else(|| {
                directories::BaseDirs::new().map(|b| b.home_dir().join(".password-store"))
            })
            .unwrap_or_else(|| PathBuf::from(".password-store"));
        Self { store_dir }
    }

    pub fn with_store_dir(store_dir: PathBuf) -> Self {
        Self { store_dir }
    }

    fn entry_name(service: &str, account: &str) -> String {
        format!(
            "{ENTRY_PREFIX}/{}/{}",
            encode_component(service),
            encode_component(account)
        )
    }

    fn pass(&self) -> Command {
        let mut cmd = Command::new("pass");
        cmd.env("PASSWORD_STORE_DIR", &self.store_dir);
        cmd
    }

    fn show(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .pass()
            .args(["show", name])
            .stderr(Stdio::piped())
            .output()
            .map_err(pass_unavailable)?;

        if !output.status.success() {
            // Missing entries are a miss, not an error
            return Ok(None);
        }
        let body = String::from_utf8_lossy(&output.stdout);
        Ok(Some(
            body.lines().next().unwrap_or_default().to_string(),
        ))
    }

    fn accounts_for(&self, service: &str) -> Result<Vec<String>> {
        let dir = self.store_dir.join(ENTRY_PREFIX).join(encode_component(service));
        let mut accounts = Vec::new();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(accounts),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(".gpg") {
                accounts.push(decode_component(stem)?);
            }
        }
        accounts.sort();
        Ok(accounts)
    }
}

impl SecretStore for PassStore {
    fn get(&self, service: &str, account: Option<&str>) -> Result<Option<Credential>> {
        let account = match account {
            Some(account) => account.to_string(),
            None => match self.accounts_for(service)?.into_iter().next() {
                Some(account) => account,
                None => return Ok(None),
            },
        };

        match self.show(&Self::entry_name(service, &account))? {
            Some(secret) => Ok(Some(Credential::new(account, secret))),
            None => Ok(None),
        }
    }

    fn list(&self, service_prefix: &str) -> Result<Vec<(String, String)>> {
        let root = self.store_dir.join(ENTRY_PREFIX);
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let service = decode_component(&entry.file_name().to_string_lossy())?;
            if !service.starts_with(service_prefix) {
                continue;
            }
            for account in self.accounts_for(&service)? {
                out.push((service.clone(), account));
            }
        }
        out.sort();
        Ok(out)
    }

    fn add_or_update(&self, service: &str, credential: &Credential) -> Result<()> {
        let name = Self::entry_name(service, credential.account());
        let mut child = self
            .pass()
            .args(["insert", "--multiline", "--force", &name])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(pass_unavailable)?;

        child
            .stdin
            .take()
            .ok_or_else(|| CoreError::Store("cannot open stdin of pass".into()))?
            .write_all(format!("{}\n", credential.secret()).as_bytes())?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(CoreError::Store(format!(
                "pass insert failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn remove(&self, service: &str, account: &str) -> Result<bool> {
        let name = Self::entry_name(service, account);
        let output = self
            .pass()
            .args(["rm", "--force", &name])
            .stderr(Stdio::piped())
            .output()
            .map_err(pass_unavailable)?;
        Ok(output.status.success())
    }
}

fn pass_unavailable(e: std::io::Error) -> CoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CoreError::Store(
            "the 'pass' binary was not found; install pass or select another credential store"
                .into(),
        )
    } else {
        CoreError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_encodes_components() {
        let name = PassStore::entry_name("git:https://github.com", "alice");
        assert_eq!(name, "credman/git%3Ahttps%3A%2F%2Fgithub.com/alice");
    }

    #[test]
    fn test_list_on_missing_store_dir_is_empty() {
        let store = PassStore::with_store_dir(PathBuf::from("/nonexistent/password-store"));
        assert!(store.list("git:").unwrap().is_empty());
        assert!(store.get("git:https://github.com", None).unwrap().is_none());
    }
}
