use std::path::Path;

use anyhow::{Context, Result};

use super::run_command;

const SCHTASKS: &str = "schtasks";

/// Builds the command line a scheduled task runs. Arguments containing
/// spaces are double-quoted.
#[must_use]
pub fn command_line(exe: &Path, args: &[String]) -> String {
    let mut line = format!("\"{}\"", exe.display());
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Registers (or replaces) a task that runs `exe` as SYSTEM at every boot.
///
/// # Errors
///
/// Returns an error if `schtasks` cannot be run or rejects the task.
pub fn install_boot_task(task_name: &str, exe: &Path, args: &[String]) -> Result<()> {
    let action = command_line(exe, args);
    tracing::info!("registering boot task \"{task_name}\": {action}");
    run_command(
        SCHTASKS,
        &[
            "/Create", "/TN", task_name, "/TR", &action, "/SC", "ONSTART", "/RU", "SYSTEM", "/RL",
            "HIGHEST", "/F",
        ],
    )
    .with_context(|| format!("failed to register boot task \"{task_name}\""))
}
