//! Buffered execution: run a shell command and collect all of its output.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::execution::Execution;
use super::options::{ProcessOptions, StdioMode};
use super::shell::shell_command;
use crate::error::{ExitKind, OutputStream, ProcessExecutionError};
use crate::registry::{KillSwitch, ProcessRegistry, RegisteredChild};

const READ_CHUNK: usize = 8 * 1024;

/// Result of a buffered execution.
#[derive(Debug)]
pub struct ExecOutput {
    /// Captured stdout, possibly partial when `error` is set.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Classified failure, `None` on success.
    pub error: Option<ProcessExecutionError>,
}

impl ExecOutput {
    fn failed(error: ProcessExecutionError) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    /// Check if the command ran and exited successfully.
    pub const fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Message describing the failure.
    ///
    /// This is the error text, or the captured stderr if the error renders
    /// as an empty string.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| {
            let message = error.to_string();
            if message.is_empty() {
                self.stderr.clone()
            } else {
                message
            }
        })
    }

    /// Stdout on success, the classified error otherwise.
    pub fn into_result(self) -> Result<String, ProcessExecutionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.stdout),
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Spawn `command` through the shell and collect its output.
///
/// The child is registered with `registry` before this returns.
pub(crate) fn exec(
    registry: &ProcessRegistry,
    command: &str,
    options: &ProcessOptions,
) -> Execution<ExecOutput> {
    let mut cmd = shell_command(command);
    options.apply(&mut cmd);
    cmd.stdin(options.stdin.unwrap_or(StdioMode::Null));
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = match tokio::process::Command::from(cmd).spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %command, error = %e, "failed to spawn command");
            return Execution::ready(ExecOutput::failed(ProcessExecutionError::spawn_failure(
                command, e,
            )));
        }
    };

    let child = registry.register(child);
    let pid = child.pid;
    debug!(?pid, command = %command, "spawned buffered command");

    let (result_tx, result_rx) = oneshot::channel();
    let command = command.to_string();
    let max_buffer = options.max_buffer;
    let timeout = options.timeout;

    tokio::spawn(async move {
        let output = collect(command, child, max_buffer, timeout).await;
        let _ = result_tx.send(output);
    });

    Execution::new(pid, result_rx, None)
}

async fn collect(
    command: String,
    mut child: RegisteredChild,
    max_buffer: usize,
    timeout: Option<Duration>,
) -> ExecOutput {
    let kill = child.kill_switch();
    let reader_kill = kill.clone();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let capture = async move {
        let (out, err) = tokio::join!(
            read_capped(stdout, max_buffer, &reader_kill),
            read_capped(stderr, max_buffer, &reader_kill)
        );
        let status = child.wait().await;
        (out, err, status)
    };
    tokio::pin!(capture);

    let mut timed_out = None;
    let (out, err, status) = match timeout {
        Some(limit) => tokio::select! {
            result = &mut capture => result,
            () = tokio::time::sleep(limit) => {
                warn!(command = %command, timeout = ?limit, "command timed out, killing it");
                timed_out = Some(limit);
                kill.trigger();
                capture.await
            }
        },
        None => capture.await,
    };

    let stdout = out.text();
    let stderr = err.text();

    let error = if out.overflowed || err.overflowed {
        let stream = if out.overflowed {
            OutputStream::Stdout
        } else {
            OutputStream::Stderr
        };
        warn!(command = %command, %stream, max_buffer, "output exceeded capture limit, child killed");
        Some(ProcessExecutionError::BufferOverflow {
            stream,
            stderr: stderr.clone(),
        })
    } else if let Some(timeout) = timed_out {
        Some(ProcessExecutionError::TimedOut { command, timeout })
    } else {
        match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(ProcessExecutionError::AbnormalExit {
                command,
                exit: ExitKind::from(status),
                stderr: stderr.clone(),
            }),
            Err(e) => {
                warn!(command = %command, error = %e, "failed to observe child exit");
                Some(ProcessExecutionError::AbnormalExit {
                    command,
                    exit: ExitKind::Unknown,
                    stderr: stderr.clone(),
                })
            }
        }
    };

    ExecOutput {
        stdout,
        stderr,
        error,
    }
}

/// Read `stream` to the end, keeping at most `limit` bytes.
///
/// On overflow the child is killed and reading stops.
async fn read_capped<R>(stream: Option<R>, limit: usize, kill: &KillSwitch) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut stream) = stream else {
        return captured;
    };

    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.bytes.extend_from_slice(&chunk[..room]);
                    captured.overflowed = true;
                    kill.trigger();
                    break;
                }
                captured.bytes.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                debug!(error = %e, "error reading child output");
                break;
            }
        }
    }

    captured
}
