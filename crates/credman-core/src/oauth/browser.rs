//! Launching the user's default web browser

use crate::Result;
use std::process::{Command, Stdio};

/// Opens authorization URLs. Abstracted so tests can capture the URL
/// instead of spawning a browser.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser, detached from the helper
/// process so Git's pipes are not inherited.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        tracing::debug!(%url, "opening system browser");
        let mut cmd = browser_command(url);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", "", url]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}

/// Records opened URLs instead of launching anything. For tests.
#[derive(Default)]
pub struct CapturingBrowser {
    pub opened: std::sync::Mutex<Vec<String>>,
}

impl BrowserLauncher for CapturingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
