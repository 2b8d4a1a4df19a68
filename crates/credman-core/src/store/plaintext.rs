//! Plaintext file store
//!
//! One directory per service, one file per account, secret as the file
//! body. Key components are percent-encoded so arbitrary service URLs map
//! onto a single path segment. Writes go through a sibling temp file that
//! is fsynced and renamed into place, so a crash leaves either the old
//! secret or the new one, never a torn file.
//!
//! Selecting this store is an explicit opt-in; the factory logs a warning.

use super::SecretStore;
use crate::{CoreError, Credential, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PlaintextStore {
    root: PathBuf,
}

impl PlaintextStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn service_dir(&self, service: &str) -> PathBuf {
        self.root.join(encode_component(service))
    }

    fn entry_path(&self, service: &str, account: &str) -> PathBuf {
        self.service_dir(service).join(encode_component(account))
    }
}

impl SecretStore for PlaintextStore {
    fn get(&self, service: &str, account: Option<&str>) -> Result<Option<Credential>> {
        let dir = self.service_dir(service);
        if !dir.is_dir() {
            return Ok(None);
        }

        match account {
            Some(account) => {
                let path = self.entry_path(service, account);
                match std::fs::read_to_string(&path) {
                    Ok(secret) => Ok(Some(Credential::new(account, secret))),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                for entry in std::fs::read_dir(&dir)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    let account = decode_component(&entry.file_name().to_string_lossy())?;
                    let secret = std::fs::read_to_string(entry.path())?;
                    return Ok(Some(Credential::new(account, secret)));
                }
                Ok(None)
            }
        }
    }

    fn list(&self, service_prefix: &str) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }

        for service_entry in std::fs::read_dir(&self.root)? {
            let service_entry = service_entry?;
            if !service_entry.file_type()?.is_dir() {
                continue;
            }
            let service = decode_component(&service_entry.file_name().to_string_lossy())?;
            if !service.starts_with(service_prefix) {
                continue;
            }
            for account_entry in std::fs::read_dir(service_entry.path())? {
                let account_entry = account_entry?;
                if !account_entry.file_type()?.is_file() {
                    continue;
                }
                let account = decode_component(&account_entry.file_name().to_string_lossy())?;
                out.push((service.clone(), account));
            }
        }
        out.sort();
        Ok(out)
    }

    fn add_or_update(&self, service: &str, credential: &Credential) -> Result<()> {
        let dir = self.service_dir(service);
        std::fs::create_dir_all(&dir)?;
        write_atomically(&dir, &self.entry_path(service, credential.account()), credential.secret())
    }

    fn remove(&self, service: &str, account: &str) -> Result<bool> {
        let path = self.entry_path(service, account);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                // Drop the service directory once its last entry is gone
                let _ = std::fs::remove_dir(self.service_dir(service));
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomically(dir: &Path, target: &Path, contents: &str) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)
        .map_err(|e| CoreError::Store(format!("cannot replace {}: {}", target.display(), e.error)))?;
    Ok(())
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

pub(super) fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if is_plain(byte as char) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

pub(super) fn decode_component(encoded: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut chars = encoded.bytes();
    while let Some(b) = chars.next() {
        if b == b'%' {
            let hi = chars.next();
            let lo = chars.next();
            let pair: Option<u8> = match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    let hex = [hi, lo];
                    std::str::from_utf8(&hex)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                }
                _ => None,
            };
            match pair {
                Some(decoded) => bytes.push(decoded),
                None => {
                    return Err(CoreError::StoreCorrupt(format!(
                        "bad escape in store entry name '{encoded}'"
                    )))
                }
            }
        } else {
            bytes.push(b);
        }
    }
    String::from_utf8(bytes)
        .map_err(|_| CoreError::StoreCorrupt(format!("store entry name '{encoded}' is not UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (PlaintextStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (PlaintextStore::new(dir.path().join("store")), dir)
    }

    #[test]
    fn test_round_trip() {
        let (store, _dir) = store();
        store
            .add_or_update("git:https://github.com", &Credential::new("alice", "s3cret"))
            .unwrap();

        let cred = store
            .get("git:https://github.com", Some("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(cred.account(), "alice");
        assert_eq!(cred.secret(), "s3cret");
    }

    #[test]
    fn test_component_encoding_round_trips() {
        for raw in ["git:https://github.com", "user@host", "a b/c%d"] {
            assert_eq!(decode_component(&encode_component(raw)).unwrap(), raw);
        }
    }

    #[test]
    fn test_second_store_wins() {
        let (store, _dir) = store();
        let service = "git:https://example.com";
        store
            .add_or_update(service, &Credential::new("alice", "first"))
            .unwrap();
        store
            .add_or_update(service, &Credential::new("alice", "second"))
            .unwrap();

        assert_eq!(
            store.get(service, Some("alice")).unwrap().unwrap().secret(),
            "second"
        );
    }

    #[test]
    fn test_get_missing_is_none() {
        let (store, _dir) = store();
        assert!(store.get("git:https://nowhere", None).unwrap().is_none());
    }

    #[test]
    fn test_remove_then_get() {
        let (store, _dir) = store();
        let service = "git:https://example.com";
        store
            .add_or_update(service, &Credential::new("alice", "pw"))
            .unwrap();

        assert!(store.remove(service, "alice").unwrap());
        assert!(store.get(service, None).unwrap().is_none());
        assert!(!store.remove(service, "alice").unwrap());
    }

    #[test]
    fn test_list_by_prefix() {
        let (store, _dir) = store();
        store
            .add_or_update("git:https://github.com", &Credential::new("a", "1"))
            .unwrap();
        store
            .add_or_update("git:https://dev.azure.com", &Credential::new("b", "2"))
            .unwrap();
        store
            .add_or_update("other:https://github.com", &Credential::new("c", "3"))
            .unwrap();

        let keys = store.list("git:").unwrap();
        assert_eq!(
            keys,
            vec![
                ("git:https://dev.azure.com".to_string(), "b".to_string()),
                ("git:https://github.com".to_string(), "a".to_string()),
            ]
        );
    }
}
