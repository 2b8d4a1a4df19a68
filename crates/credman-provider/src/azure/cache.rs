//! Azure Repos sign-in and authority cache
//!
//! Durable storage of per-organization OAuth authorities and of signed-in
//! users at organization and remote scope, with the precedence rule:
//! a non-empty remote-level user wins, an *empty* remote-level user means
//! "explicitly signed out here" and suppresses the organization-level
//! user, and otherwise the organization-level user is inherited.
//!
//! Keys follow a dotted convention in a flat INI file:
//!
//! ```ini
//! org.contoso.authority=https://login.microsoftonline.com/T1
//! org.contoso.user=alice@contoso.com
//! remote.https://dev.azure.com/contoso/_git/widgets.user=
//! ```
//!
//! Every mutation reloads the backing file, applies its change, and
//! commits atomically, so concurrent helper invocations can lose an
//! update to each other but never corrupt the file.

use credman_core::store::IniStore;
use credman_core::{canonical_url, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use url::Url;

pub struct AzureReposCache {
    ini: Mutex<IniStore>,
}

impl AzureReposCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            ini: Mutex::new(IniStore::new(path)),
        }
    }

    /// The platform-default cache location, e.g.
    /// `$XDG_DATA_HOME/credman/azrepos.ini`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "credman").ok_or_else(|| {
            credman_core::CoreError::Store("cannot determine user data directory".into())
        })?;
        Ok(dirs.data_dir().join("azrepos.ini"))
    }

    fn authority_key(org: &str) -> String {
        format!("org.{org}.authority")
    }

    fn org_user_key(org: &str) -> String {
        format!("org.{org}.user")
    }

    fn remote_user_key(remote: &Url) -> String {
        format!("remote.{}.user", canonical_url(remote, true))
    }

    /// Reload the working copy, treating a corrupt file as empty. Read
    /// paths never fail because of cache damage; at worst we re-discover.
    fn reload_tolerant(ini: &mut IniStore) {
        if let Err(e) = ini.reload() {
            tracing::warn!("ignoring unreadable cache: {e}");
        }
    }

    fn with_read<T>(&self, read: impl FnOnce(&IniStore) -> T) -> T {
        let mut ini = self.ini.lock().unwrap();
        Self::reload_tolerant(&mut ini);
        read(&ini)
    }

    fn with_mutation(&self, mutate: impl FnOnce(&mut IniStore)) -> Result<()> {
        let mut ini = self.ini.lock().unwrap();
        Self::reload_tolerant(&mut ini);
        mutate(&mut ini);
        ini.commit()
    }

    // Authority operations

    pub fn get_authority(&self, org: &str) -> Option<String> {
        self.with_read(|ini| ini.get(&Self::authority_key(org)).map(str::to_string))
    }

    pub fn update_authority(&self, org: &str, authority: &str) -> Result<()> {
        self.with_mutation(|ini| ini.set(Self::authority_key(org), authority))
    }

    pub fn erase_authority(&self, org: &str) -> Result<()> {
        self.with_mutation(|ini| {
            ini.remove(&Self::authority_key(org));
        })
    }

    /// Remove every cached authority, leaving user bindings intact.
    pub fn clear_authorities(&self) -> Result<()> {
        self.with_mutation(|ini| {
            for org in ini.section_scopes("org") {
                ini.remove(&Self::authority_key(&org));
            }
        })
    }

    // User bindings

    pub fn get_org_user(&self, org: &str) -> Option<String> {
        self.with_read(|ini| ini.get(&Self::org_user_key(org)).map(str::to_string))
    }

    /// Remote-level user. `Some("")` is the explicit signed-out marker.
    pub fn get_remote_user(&self, remote: &Url) -> Option<String> {
        self.with_read(|ini| ini.get(&Self::remote_user_key(remote)).map(str::to_string))
    }

    pub fn sign_in_org(&self, org: &str, user: &str) -> Result<()> {
        self.with_mutation(|ini| ini.set(Self::org_user_key(org), user))
    }

    pub fn sign_in_remote(&self, remote: &Url, user: &str) -> Result<()> {
        self.with_mutation(|ini| ini.set(Self::remote_user_key(remote), user))
    }

    pub fn sign_out_org(&self, org: &str) -> Result<()> {
        self.with_mutation(|ini| {
            ini.remove(&Self::org_user_key(org));
        })
    }

    /// Sign out at remote scope.
    ///
    /// With `explicit = false` the remote entry is removed and the remote
    /// resumes inheriting the organization user. With `explicit = true` the
    /// empty-string marker is written instead, pinning the remote to
    /// "no user" until an explicit sign-in at the same scope.
    pub fn sign_out_remote(&self, remote: &Url, explicit: bool) -> Result<()> {
        self.with_mutation(|ini| {
            let key = Self::remote_user_key(remote);
            if explicit {
                ini.set(key, "");
            } else {
                ini.remove(&key);
            }
        })
    }

    pub fn get_org_users(&self) -> BTreeMap<String, String> {
        self.with_read(|ini| {
            ini.section_scopes("org")
                .into_iter()
                .filter_map(|org| {
                    let user = ini.get(&Self::org_user_key(&org))?;
                    Some((org, user.to_string()))
                })
                .collect()
        })
    }

    /// All remote-level bindings whose key parses as a URL; damaged keys
    /// are skipped rather than failing the listing.
    pub fn get_remote_users(&self) -> BTreeMap<Url, String> {
        self.with_read(|ini| {
            ini.section_scopes("remote")
                .into_iter()
                .filter_map(|scope| {
                    let url = match Url::parse(&scope) {
                        Ok(url) => url,
                        Err(_) => {
                            tracing::warn!(%scope, "skipping unparseable remote in cache");
                            return None;
                        }
                    };
                    let user = ini.get(&format!("remote.{scope}.user"))?;
                    Some((url, user.to_string()))
                })
                .collect()
        })
    }

    /// The user that resolves for a remote after applying remote-vs-org
    /// precedence and the explicit-signout rule.
    pub fn effective_user(&self, org: &str, remote: &Url) -> Option<String> {
        self.with_read(|ini| {
            match ini.get(&Self::remote_user_key(remote)) {
                Some("") => None, // explicitly signed out
                Some(user) => Some(user.to_string()),
                None => ini.get(&Self::org_user_key(org)).map(str::to_string),
            }
        })
    }

    /// Apply the sign-in bookkeeping after Git confirms a credential.
    ///
    /// First sign-in claims the organization scope and clears any stale
    /// remote entry; a different user on one remote is pinned at remote
    /// scope; a matching user drops the remote entry so inheritance is
    /// preferred.
    pub fn record_store(&self, org: &str, remote: &Url, user: &str) -> Result<()> {
        self.with_mutation(|ini| {
            let org_key = Self::org_user_key(org);
            let remote_key = Self::remote_user_key(remote);
            let org_user = ini.get(&org_key).map(str::to_string);
            match org_user.as_deref() {
                None => {
                    ini.set(org_key, user);
                    ini.remove(&remote_key);
                }
                Some(existing) if existing != user => {
                    ini.set(remote_key, user);
                }
                Some(_) => {
                    ini.remove(&remote_key);
                }
            }
        })
    }

    /// Apply the sign-out bookkeeping after Git rejects a credential.
    ///
    /// When an organization user exists the remote is marked explicitly
    /// signed out so the next attempt re-prompts instead of silently
    /// reusing the same account. The cached authority is always dropped: a
    /// rejected credential may mean the authority itself went stale.
    pub fn record_erase(&self, org: &str, remote: &Url) -> Result<()> {
        self.with_mutation(|ini| {
            let remote_key = Self::remote_user_key(remote);
            if ini.get(&Self::org_user_key(org)).is_some() {
                ini.set(remote_key, "");
            } else {
                ini.remove(&remote_key);
            }
            ini.remove(&Self::authority_key(org));
        })
    }
}
