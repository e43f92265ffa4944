//! OS integration: adapter enumeration, command execution, config-drive
//! discovery and boot-task registration.

mod adapters;
mod drive;
mod netsh;
mod task;

use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};

#[cfg(not(windows))]
pub use adapters::PnetInventory;
pub use adapters::{DryRunInventory, PowerShellInventory};
pub use drive::{find_document, locate_document};
pub use netsh::{Invocation, NetshSink, render};
pub use task::{command_line, install_boot_task};

pub(crate) const POWERSHELL: &str = "powershell";

/// Inventory backed by the host's own adapter listing.
#[cfg(windows)]
pub type HostInventory = PowerShellInventory;
#[cfg(not(windows))]
pub type HostInventory = PnetInventory;

#[must_use]
pub fn host_inventory() -> HostInventory {
    HostInventory::default()
}

/// Runs a command and fails unless it exits successfully.
///
/// # Errors
///
/// * the command could not be spawned
/// * the command exited with a non-zero status; the error carries its output
pub fn run_command(cmd: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(cmd)
        .args(args.iter().filter(|a| !a.is_empty()))
        .output()
        .with_context(|| format!("failed to execute {cmd}"))?;
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!("{cmd} exited with {}: {}", output.status, diagnostic(&output)))
}

/// Runs a command and returns its stdout if it succeeded.
#[must_use]
pub fn run_command_output(cmd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(cmd).args(args).output().ok()?;
    if output.status.success() {
        return Some(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    tracing::debug!("{cmd} failed: {}", diagnostic(&output));
    None
}

// netsh reports errors on stdout, PowerShell on stderr.
fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quotes `s` as a PowerShell single-quoted string.
pub(crate) fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quotes `s` for a cmdlet parameter that takes a wildcard pattern, so that
/// only the literal name matches.
pub(crate) fn ps_literal_pattern(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '`') {
            escaped.push('`');
        }
        escaped.push(c);
    }
    ps_quote(&escaped)
}
