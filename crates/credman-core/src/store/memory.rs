//! In-memory secret store
//!
//! Holds nothing across invocations. Used as the `memory` backend (a
//! null store for CI) and throughout the test suites.

use super::SecretStore;
use crate::{Credential, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default, Debug)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, account: Option<&str>) -> Result<Option<Credential>> {
        let entries = self.entries.lock().unwrap();
        let found = entries.iter().find(|((s, a), _)| {
            s == service && account.map_or(true, |wanted| wanted == a)
        });
        Ok(found.map(|((_, a), secret)| Credential::new(a.clone(), secret.clone())))
    }

    fn list(&self, service_prefix: &str) -> Result<Vec<(String, String)>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .keys()
            .filter(|(s, _)| s.starts_with(service_prefix))
            .cloned()
            .collect())
    }

    fn add_or_update(&self, service: &str, credential: &Credential) -> Result<()> {
        self.entries.lock().unwrap().insert(
            (service.to_string(), credential.account().to_string()),
            credential.secret().to_string(),
        );
        Ok(())
    }

    fn remove(&self, service: &str, account: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }
}
