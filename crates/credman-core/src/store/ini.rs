//! Transactional INI store
//!
//! A flat `key=value` file with a single implicit section and dotted keys,
//! used by provider caches. Mutations operate on an in-memory working copy;
//! [`IniStore::commit`] serializes it to a sibling temp file, fsyncs, and
//! renames over the target. The file on disk is therefore always the last
//! committed state: two racing processes can lose an update to each other,
//! but neither can produce a torn file.

use crate::{CoreError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct IniStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IniStore {
    /// A store over `path` with an empty working copy; call
    /// [`reload`](Self::reload) to read the on-disk state.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the working copy with the on-disk state.
    ///
    /// A missing file is an empty store. An unparseable file fails with
    /// [`CoreError::StoreCorrupt`] and leaves the working copy empty.
    pub fn reload(&mut self) -> Result<()> {
        self.entries.clear();
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    self.entries
                        .insert(key.trim_end().to_string(), value.trim_start().to_string());
                }
                None => {
                    return Err(CoreError::StoreCorrupt(format!(
                        "{}: line {} is not a key=value pair",
                        self.path.display(),
                        lineno + 1
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// The set of `x` for which any key `<prefix>.<x>.*` exists.
    ///
    /// The scope is everything between the prefix dot and the final dot, so
    /// scopes may themselves contain dots (organization names, remote URLs).
    pub fn section_scopes(&self, prefix: &str) -> BTreeSet<String> {
        let lead = format!("{prefix}.");
        self.entries
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&lead)?;
                let (scope, _property) = rest.rsplit_once('.')?;
                Some(scope.to_string())
            })
            .collect()
    }

    /// Serialize the working copy and atomically replace the target file.
    pub fn commit(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        for (key, value) in &self.entries {
            writeln!(tmp, "{key}={value}")?;
        }
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            CoreError::Store(format!(
                "cannot replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;
        Ok(())
    }
}
