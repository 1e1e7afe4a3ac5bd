//! Streamed execution: the child's output passes straight through.
//!
//! Streams are inherited from the parent by default so console output is
//! visible as it happens. A caller that pipes stderr gets it back as the
//! failure reason; a piped stdout is forwarded line by line. Forwarding is
//! best effort: output that does not fit in the channel is dropped, so a
//! caller that never reads it cannot stall the child.

use std::io;
use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::execution::{Execution, ProcessOutput};
use super::options::{ProcessOptions, StdioMode};
use crate::error::{ExitKind, ProcessExecutionError};
use crate::registry::ProcessRegistry;

/// Capacity of the forwarded output channel.
const OUTPUT_BUFFER: usize = 1000;

const READ_CHUNK: usize = 8 * 1024;

/// Final state of a streamed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOutcome {
    /// How the child terminated, `None` if it never ran or could not be observed.
    pub status: Option<ExitKind>,

    /// Why the command failed, `None` on success.
    pub failure: Option<String>,
}

impl SpawnOutcome {
    /// Check if the process exited successfully.
    pub const fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Spawn `program` with `args`, inheriting unset streams from the parent.
///
/// The child is registered with `registry` before this returns.
pub(crate) fn spawn(
    registry: &ProcessRegistry,
    program: &str,
    args: &[String],
    options: &ProcessOptions,
) -> Execution<SpawnOutcome> {
    let mut cmd = std::process::Command::new(program);
    cmd.args(args);
    options.apply(&mut cmd);
    options.apply_stdio(&mut cmd, StdioMode::Inherit);

    let child = match tokio::process::Command::from(cmd).spawn() {
        Ok(child) => child,
        Err(e) => {
            let error = ProcessExecutionError::spawn_failure(program, e);
            warn!(program, error = %error, "failed to spawn command");
            return Execution::ready(SpawnOutcome {
                status: None,
                failure: Some(error.to_string()),
            });
        }
    };

    let mut child = registry.register(child);
    let pid = child.pid;
    debug!(?pid, program, ?args, "spawned streamed command");

    // Nothing writes to a piped stdin; close it so the child sees EOF.
    drop(child.stdin.take());
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let forwards_output = stdout.is_some() || stderr.is_some();

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
    let (result_tx, result_rx) = oneshot::channel();
    let fallback = failure_message(program, args);

    tokio::spawn(async move {
        let ((), stderr) = tokio::join!(
            forward_stdout(stdout, output_tx.clone()),
            accumulate_stderr(stderr, output_tx)
        );
        let status = child.wait().await;
        let _ = result_tx.send(resolve(status, stderr, fallback));
    });

    Execution::new(pid, result_rx, forwards_output.then_some(output_rx))
}

/// Failure reason used when no stderr was captured.
fn failure_message(program: &str, args: &[String]) -> String {
    format!("Command failed: {program} {}", args.join(" "))
}

fn resolve(status: io::Result<ExitStatus>, stderr: String, fallback: String) -> SpawnOutcome {
    let status = match status {
        Ok(status) if status.success() => {
            return SpawnOutcome {
                status: Some(ExitKind::from(status)),
                failure: None,
            };
        }
        Ok(status) => Some(ExitKind::from(status)),
        Err(e) => {
            warn!(error = %e, "failed to observe child exit");
            None
        }
    };

    let failure = if stderr.is_empty() { fallback } else { stderr };
    SpawnOutcome {
        status,
        failure: Some(failure),
    }
}

/// Hand `item` to the output channel without waiting.
///
/// Returns `false` once the receiver is gone. When the channel is full the
/// item is dropped: reading the pipe must never wait on the caller.
fn forward(tx: &mpsc::Sender<ProcessOutput>, item: ProcessOutput) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            trace!("output channel full, dropping forwarded output");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn forward_stdout(stdout: Option<ChildStdout>, tx: mpsc::Sender<ProcessOutput>) {
    let Some(stdout) = stdout else {
        return;
    };

    let mut forwarding = true;
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if forwarding {
                    forwarding = forward(&tx, ProcessOutput::Stdout(line));
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "error reading child stdout");
                break;
            }
        }
    }
}

async fn accumulate_stderr(stderr: Option<ChildStderr>, tx: mpsc::Sender<ProcessOutput>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };

    let mut forwarding = true;
    let mut collected = Vec::new();
    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                collected.extend_from_slice(&chunk[..n]);
                if forwarding {
                    let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
                    forwarding = forward(&tx, ProcessOutput::Stderr(text));
                }
            }
            Err(e) => {
                debug!(error = %e, "error reading child stderr");
                break;
            }
        }
    }

    String::from_utf8_lossy(&collected).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_spawn_success() {
        let outcome = spawn(&ProcessRegistry::new(), "true", &[], &ProcessOptions::new())
            .wait()
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.status, Some(ExitKind::Code(0)));
    }

    #[tokio::test]
    async fn test_spawn_failure_without_stderr() {
        let outcome = spawn(
            &ProcessRegistry::new(),
            "sh",
            &args(&["-c", "exit 2"]),
            &ProcessOptions::new(),
        )
        .wait()
        .await
        .unwrap();

        assert_eq!(outcome.status, Some(ExitKind::Code(2)));
        assert_eq!(outcome.failure.as_deref(), Some("Command failed: sh -c exit 2"));
    }

    #[tokio::test]
    async fn test_spawn_failure_with_piped_stderr() {
        let outcome = spawn(
            &ProcessRegistry::new(),
            "sh",
            &args(&["-c", "printf boom >&2; exit 2"]),
            &ProcessOptions::new().pipe_stderr(),
        )
        .wait()
        .await
        .unwrap();

        assert_eq!(outcome.failure.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_piped_stderr_ignored_on_success() {
        let outcome = spawn(
            &ProcessRegistry::new(),
            "sh",
            &args(&["-c", "printf noise >&2"]),
            &ProcessOptions::new().pipe_stderr(),
        )
        .wait()
        .await
        .unwrap();

        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_signal_counts_as_failure() {
        let outcome = spawn(
            &ProcessRegistry::new(),
            "sh",
            &args(&["-c", "kill -9 $$"]),
            &ProcessOptions::new(),
        )
        .wait()
        .await
        .unwrap();

        assert_eq!(outcome.status, Some(ExitKind::Signal(9)));
        assert!(outcome.failure.unwrap().starts_with("Command failed: sh -c"));
    }

    #[tokio::test]
    async fn test_forwards_piped_stdout() {
        let mut execution = spawn(
            &ProcessRegistry::new(),
            "sh",
            &args(&["-c", "echo one; echo two"]),
            &ProcessOptions::new().stdout(StdioMode::Piped),
        );

        let mut output = execution.take_output().unwrap();
        let mut lines = Vec::new();
        while let Some(item) = output.recv().await {
            if let ProcessOutput::Stdout(line) = item {
                lines.push(line);
            }
        }

        assert_eq!(lines, vec!["one", "two"]);
        assert!(execution.wait().await.unwrap().success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unread_stderr_does_not_stall_child() {
        let registry = ProcessRegistry::new();
        let script = "i=0; while [ $i -lt 1200 ]; do printf '%04000d' 0 >&2; sleep 0.002; \
                      i=$((i+1)); done; exit 1";
        let execution = spawn(
            &registry,
            "sh",
            &args(&["-c", script]),
            &ProcessOptions::new().pipe_stderr(),
        );

        // Hold the execution without ever reading its output channel.
        tokio::time::timeout(Duration::from_secs(60), registry.wait_for_quiescence())
            .await
            .unwrap();
        assert_eq!(registry.live_count(), 0);

        let outcome = execution.wait().await.unwrap();
        assert_eq!(outcome.status, Some(ExitKind::Code(1)));
        assert_eq!(outcome.failure.unwrap().len(), 1200 * 4000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unread_stdout_does_not_stall_child() {
        let registry = ProcessRegistry::new();
        let mut execution = spawn(
            &registry,
            "sh",
            &args(&["-c", "seq 1 20000"]),
            &ProcessOptions::new().stdout(StdioMode::Piped),
        );

        tokio::time::timeout(Duration::from_secs(30), registry.wait_for_quiescence())
            .await
            .unwrap();

        let mut output = execution.take_output().unwrap();
        let mut forwarded = 0;
        while let Some(item) = output.recv().await {
            assert!(matches!(item, ProcessOutput::Stdout(_)));
            forwarded += 1;
        }

        assert!(forwarded <= OUTPUT_BUFFER);
        assert!(execution.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_inherited_streams_have_no_output_channel() {
        let mut execution = spawn(&ProcessRegistry::new(), "true", &[], &ProcessOptions::new());
        assert!(execution.take_output().is_none());
        execution.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_error_reported_once() {
        let registry = ProcessRegistry::new();
        let outcome = spawn(&registry, "nonexistent_command_12345", &[], &ProcessOptions::new())
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.status, None);
        assert!(outcome.failure.unwrap().contains("nonexistent_command_12345"));
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_registers_before_return() {
        let registry = ProcessRegistry::new();
        let execution = spawn(&registry, "sleep", &args(&["0.2"]), &ProcessOptions::new());
        assert_eq!(registry.live_count(), 1);

        execution.wait().await.unwrap();
        assert_eq!(registry.live_count(), 0);
    }
}
