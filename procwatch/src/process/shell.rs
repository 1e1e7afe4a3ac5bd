//! Platform shell used to interpret command strings.
//!
//! The implementation is picked at build time; each platform gets exactly
//! one way of turning a command line into a process.

use std::process::Command;

/// Build a command that runs `command` through the platform shell.
#[cfg(unix)]
pub(crate) fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Build a command that runs `command` through the platform shell.
#[cfg(windows)]
pub(crate) fn shell_command(command: &str) -> Command {
    let shell = std::env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".to_string());
    let mut cmd = Command::new(shell);
    cmd.args(["/d", "/s", "/c"]).arg(command);
    cmd
}
