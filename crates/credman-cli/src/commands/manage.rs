//! Management commands: `configure`, `unconfigure`, `version`

use anyhow::{bail, Context, Result};
use std::process::Command;

const HELPER_KEY: &str = "credential.helper";

pub fn configure(system: bool) -> Result<()> {
    let helper = helper_path()?;
    let scope = scope_flag(system);
    let current = helper_entries(scope)?;

    if current.last().map(String::as_str) == Some(helper.as_str()) {
        eprintln!("credman is already configured as the credential helper");
        return Ok(());
    }

    // The leading empty entry resets any helpers configured in wider
    // scopes, so credman is the only helper that runs.
    if !current.contains(&String::new()) {
        git_config(scope, &["--add", HELPER_KEY, ""])?;
    }
    git_config(scope, &["--add", HELPER_KEY, &helper])?;

    eprintln!("configured credman as the Git credential helper ({})", scope_name(system));
    Ok(())
}

pub fn unconfigure(system: bool) -> Result<()> {
    let helper = helper_path()?;
    let scope = scope_flag(system);
    let current = helper_entries(scope)?;

    if current.iter().any(|v| v == &helper) {
        git_config(scope, &["--fixed-value", "--unset-all", HELPER_KEY, &helper])?;
    }
    // Drop the reset entry we added alongside the helper
    if current.iter().any(String::is_empty) {
        git_config(scope, &["--fixed-value", "--unset-all", HELPER_KEY, ""])?;
    }

    eprintln!("removed credman from the Git credential configuration ({})", scope_name(system));
    Ok(())
}

pub fn version() -> Result<()> {
    let commit = option_env!("CREDMAN_BUILD_COMMIT").unwrap_or("unknown");
    println!(
        "git-credential-credman {} (commit {commit})",
        env!("CARGO_PKG_VERSION")
    );
    println!("os: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    println!("runtime: rust");
    Ok(())
}

fn helper_path() -> Result<String> {
    let exe = std::env::current_exe().context("cannot locate the helper executable")?;
    Ok(exe.to_string_lossy().into_owned())
}

fn scope_flag(system: bool) -> &'static str {
    if system {
        "--system"
    } else {
        "--global"
    }
}

fn scope_name(system: bool) -> &'static str {
    if system {
        "system"
    } else {
        "global"
    }
}

/// All configured `credential.helper` values in the scope, in order.
fn helper_entries(scope: &str) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["config", scope, "--get-all", HELPER_KEY])
        .output()
        .context("cannot invoke git")?;

    // Exit code 1 from --get-all means the key is unset
    if !output.status.success() {
        return Ok(Vec::new());
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect())
}

fn git_config(scope: &str, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .arg("config")
        .arg(scope)
        .args(args)
        .output()
        .context("cannot invoke git")?;

    if !output.status.success() {
        bail!(
            "git config {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
