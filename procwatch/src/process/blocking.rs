//! Blocking execution on the calling thread.
//!
//! Not tracked by the registry: the caller is blocked for the whole run, so
//! there is never a concurrently "still running" child to report.
//!
//! Unless the caller configures stderr, it is captured for the error and
//! also copied to the parent's stderr once the child exits.

use std::io::{self, Write};
use std::process::Stdio;

use tracing::debug;

use super::options::{ProcessOptions, StdioMode};
use super::shell::shell_command;
use crate::error::{ExitKind, ProcessExecutionError};

/// Run `command` through the shell, block until it exits and return its
/// stdout with surrounding whitespace trimmed.
pub(crate) fn exec_sync(
    command: &str,
    options: &ProcessOptions,
) -> Result<String, ProcessExecutionError> {
    exec_sync_relaying(command, options, &mut io::stderr().lock())
}

fn exec_sync_relaying<W: Write>(
    command: &str,
    options: &ProcessOptions,
    relay: &mut W,
) -> Result<String, ProcessExecutionError> {
    let mut cmd = shell_command(command);
    options.apply(&mut cmd);
    cmd.stdin(options.stdin.unwrap_or(StdioMode::Null));
    cmd.stdout(Stdio::piped());
    cmd.stderr(options.stderr.unwrap_or(StdioMode::Piped));

    let output = cmd
        .output()
        .map_err(|e| ProcessExecutionError::spawn_failure(command, e))?;

    debug!(command, status = ?output.status, "blocking command finished");

    if options.stderr.is_none() && !output.stderr.is_empty() {
        if let Err(e) = relay.write_all(&output.stderr).and_then(|()| relay.flush()) {
            debug!(error = %e, "failed to relay child stderr");
        }
    }

    if !output.status.success() {
        return Err(ProcessExecutionError::AbnormalExit {
            command: command.to_string(),
            exit: ExitKind::from(output.status),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_exec_sync_trims() {
        let stdout = exec_sync("printf '  hi \\n'", &ProcessOptions::new()).unwrap();
        assert_eq!(stdout, "hi");
    }

    #[test]
    fn test_exec_sync_env() {
        let stdout = exec_sync(
            "echo $GREETING",
            &ProcessOptions::new().env("GREETING", "hello"),
        )
        .unwrap();
        assert_eq!(stdout, "hello");
    }

    #[test]
    fn test_exec_sync_non_zero() {
        let error = exec_sync("echo nope >&2; exit 4", &ProcessOptions::new()).unwrap_err();
        assert_eq!(error.exit_code(), Some(4));
        assert!(error.to_string().ends_with("nope\n"));
    }

    #[test]
    fn test_exec_sync_relays_stderr_on_success() {
        let mut relayed = Vec::new();
        let stdout = exec_sync_relaying(
            "echo out; echo warning >&2",
            &ProcessOptions::new(),
            &mut relayed,
        )
        .unwrap();

        assert_eq!(stdout, "out");
        assert_eq!(relayed, b"warning\n");
    }

    #[test]
    fn test_exec_sync_relays_and_reports_stderr_on_failure() {
        let mut relayed = Vec::new();
        let error = exec_sync_relaying("echo nope >&2; exit 4", &ProcessOptions::new(), &mut relayed)
            .unwrap_err();

        assert_eq!(relayed, b"nope\n");
        assert!(error.to_string().ends_with("nope\n"));
    }

    #[test]
    fn test_exec_sync_explicit_stderr_not_relayed() {
        let mut relayed = Vec::new();
        let error = exec_sync_relaying(
            "echo hidden >&2; exit 1",
            &ProcessOptions::new().stderr(StdioMode::Null),
            &mut relayed,
        )
        .unwrap_err();

        assert!(relayed.is_empty());
        assert!(matches!(
            error,
            ProcessExecutionError::AbnormalExit { ref stderr, .. } if stderr.is_empty()
        ));
    }

    #[test]
    fn test_exec_sync_spawn_failure() {
        let error = exec_sync(
            "true",
            &ProcessOptions::new().working_dir("/nonexistent/dir/12345"),
        )
        .unwrap_err();
        assert!(error.is_spawn_failure());
    }
}
