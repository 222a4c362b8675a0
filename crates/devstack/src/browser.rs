//! Open a URL in the default system browser.
//!
//! Cross-platform support:
//! - Linux: `xdg-open`
//! - macOS: `open`
//! - Windows: `cmd /C start`
//!
//! Only http and https URLs are accepted.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

pub fn open_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(anyhow::anyhow!("only http/https URLs can be opened: {url}"));
    }

    let mut command = platform_open_command(url)?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to open browser for {url}"))?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn platform_open_command(url: &str) -> Result<Command> {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    Ok(command)
}

#[cfg(target_os = "macos")]
fn platform_open_command(url: &str) -> Result<Command> {
    let mut command = Command::new("open");
    command.arg(url);
    Ok(command)
}

#[cfg(windows)]
fn platform_open_command(url: &str) -> Result<Command> {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    Ok(command)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn platform_open_command(_url: &str) -> Result<Command> {
    Err(anyhow::anyhow!("unsupported platform for opening URLs"))
}
