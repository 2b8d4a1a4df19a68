//! Interactive prompting
//!
//! Providers talk to the user through the [`Prompter`] trait so that the
//! terminal implementation can be swapped for a scripted one in tests, or
//! for [`DisabledPrompter`] when `credential.interactive` is off.

use crate::{CoreError, Credential, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for a username (unless one is already known) and password.
    async fn prompt_basic(&self, resource: &str, username: Option<&str>) -> Result<Credential>;

    /// Ask for a single secret value, e.g. a personal access token.
    async fn prompt_secret(&self, message: &str) -> Result<String>;

    /// Offer a menu of options; returns the selected index.
    async fn prompt_select(&self, message: &str, items: &[String]) -> Result<usize>;

    /// Show a device-code sign-in instruction to the user.
    async fn show_device_code(&self, user_code: &str, verification_uri: &str) -> Result<()>;
}

/// Prompter backed by the controlling terminal.
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

fn prompt_error(e: dialoguer::Error) -> CoreError {
    // dialoguer surfaces Ctrl-C / closed TTYs as I/O errors
    match e {
        dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            CoreError::Canceled
        }
        dialoguer::Error::IO(io) => CoreError::Io(io),
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt_basic(&self, resource: &str, username: Option<&str>) -> Result<Credential> {
        let resource = resource.to_string();
        let username = username.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            eprintln!("Enter credentials for '{resource}'");
            let username = match username {
                Some(u) if !u.is_empty() => u,
                _ => dialoguer::Input::<String>::new()
                    .with_prompt("Username")
                    .interact_text()
                    .map_err(prompt_error)?,
            };
            let password = dialoguer::Password::new()
                .with_prompt("Password")
                .interact()
                .map_err(prompt_error)?;
            Ok(Credential::new(username, password))
        })
        .await
        .map_err(|e| CoreError::Internal(format!("prompt task failed: {e}")))?
    }

    async fn prompt_secret(&self, message: &str) -> Result<String> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            dialoguer::Password::new()
                .with_prompt(message)
                .interact()
                .map_err(prompt_error)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("prompt task failed: {e}")))?
    }

    async fn prompt_select(&self, message: &str, items: &[String]) -> Result<usize> {
        let message = message.to_string();
        let items = items.to_vec();
        tokio::task::spawn_blocking(move || {
            dialoguer::Select::new()
                .with_prompt(message)
                .items(&items)
                .default(0)
                .interact()
                .map_err(prompt_error)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("prompt task failed: {e}")))?
    }

    async fn show_device_code(&self, user_code: &str, verification_uri: &str) -> Result<()> {
        eprintln!("To sign in, visit {verification_uri} and enter the code {user_code}");
        Ok(())
    }
}

/// Prompter used when interactivity has been disabled; every request fails
/// with [`CoreError::InteractionDisabled`].
pub struct DisabledPrompter;

#[async_trait]
impl Prompter for DisabledPrompter {
    async fn prompt_basic(&self, _resource: &str, _username: Option<&str>) -> Result<Credential> {
        Err(CoreError::InteractionDisabled)
    }

    async fn prompt_secret(&self, _message: &str) -> Result<String> {
        Err(CoreError::InteractionDisabled)
    }

    async fn prompt_select(&self, _message: &str, _items: &[String]) -> Result<usize> {
        Err(CoreError::InteractionDisabled)
    }

    async fn show_device_code(&self, _user_code: &str, _verification_uri: &str) -> Result<()> {
        Err(CoreError::InteractionDisabled)
    }
}

/// Prompter that replays canned answers. For tests.
#[derive(Default)]
pub struct ScriptedPrompter {
    pub basic: Option<Credential>,
    pub secret: Option<String>,
    pub selection: usize,
}

impl ScriptedPrompter {
    pub fn with_basic(account: &str, secret: &str) -> Self {
        Self {
            basic: Some(Credential::new(account, secret)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn prompt_basic(&self, _resource: &str, username: Option<&str>) -> Result<Credential> {
        let cred = self.basic.clone().ok_or(CoreError::Canceled)?;
        Ok(match username {
            Some(u) if !u.is_empty() => Credential::new(u, cred.secret()),
            _ => cred,
        })
    }

    async fn prompt_secret(&self, _message: &str) -> Result<String> {
        self.secret.clone().ok_or(CoreError::Canceled)
    }

    async fn prompt_select(&self, _message: &str, _items: &[String]) -> Result<usize> {
        Ok(self.selection)
    }

    async fn show_device_code(&self, _user_code: &str, _verification_uri: &str) -> Result<()> {
        Ok(())
    }
}
