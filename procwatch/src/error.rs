//! Error taxonomy for process execution.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited with the given status code.
    Code(i32),
    /// Terminated by the given signal (Unix only).
    Signal(i32),
    /// The platform reported neither a code nor a signal.
    Unknown,
}

impl From<ExitStatus> for ExitKind {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }

        Self::Unknown
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Unknown => f.write_str("unknown status"),
        }
    }
}

/// Which output stream overran its capture limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Classified failure of a child process.
#[derive(Error, Debug)]
pub enum ProcessExecutionError {
    /// The OS could not create the process.
    #[error("Failed to spawn process `{command}`: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited non-zero or was signaled.
    #[error("Command failed: {command}\n{stderr}")]
    AbnormalExit {
        command: String,
        exit: ExitKind,
        stderr: String,
    },

    /// Buffered capture exceeded `max_buffer`. The captured stderr is kept
    /// so the caller does not lose diagnostic output.
    #[error("Error: {stream} maxBuffer length exceeded. Partial output follows:\n\n{stderr}")]
    BufferOverflow {
        stream: OutputStream,
        stderr: String,
    },

    /// The process outlived its configured timeout and was killed.
    #[error("Command timed out after {}ms: {command}", .timeout.as_millis())]
    TimedOut { command: String, timeout: Duration },
}

impl ProcessExecutionError {
    pub fn spawn_failure(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailure {
            command: command.into(),
            source,
        }
    }

    pub const fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailure { .. })
    }

    pub const fn is_buffer_overflow(&self) -> bool {
        matches!(self, Self::BufferOverflow { .. })
    }

    /// Exit code of an abnormal exit, if the process produced one.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::AbnormalExit {
                exit: ExitKind::Code(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_overflow_message() {
        let error = ProcessExecutionError::BufferOverflow {
            stream: OutputStream::Stderr,
            stderr: "partial".to_string(),
        };
        let message = error.to_string();
        assert!(message.starts_with("Error: stderr maxBuffer length exceeded."));
        assert!(message.ends_with("Partial output follows:\n\npartial"));
        assert!(error.is_buffer_overflow());
        assert!(!error.is_spawn_failure());
    }

    #[test]
    fn test_abnormal_exit_code() {
        let error = ProcessExecutionError::AbnormalExit {
            command: "false".to_string(),
            exit: ExitKind::Code(1),
            stderr: String::new(),
        };
        assert_eq!(error.exit_code(), Some(1));
        assert!(error.to_string().starts_with("Command failed: false"));

        let signaled = ProcessExecutionError::AbnormalExit {
            command: "sleep 10".to_string(),
            exit: ExitKind::Signal(9),
            stderr: String::new(),
        };
        assert_eq!(signaled.exit_code(), None);
    }

    #[test]
    fn test_spawn_failure_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let error = ProcessExecutionError::spawn_failure("nope", io);
        assert!(error.is_spawn_failure());
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("`nope`"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_kind_from_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(ExitKind::from(ExitStatus::from_raw(0)), ExitKind::Code(0));
        assert_eq!(ExitKind::from(ExitStatus::from_raw(2 << 8)), ExitKind::Code(2));
        assert_eq!(ExitKind::from(ExitStatus::from_raw(9)), ExitKind::Signal(9));
    }
}
