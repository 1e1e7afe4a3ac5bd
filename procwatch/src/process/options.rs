//! Caller-supplied configuration shared by every execution mode.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Default per-stream capture limit for buffered execution (1 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

/// How one standard stream of the child is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the parent's stream.
    Inherit,
    /// Connect a pipe the executor reads from (or writes to).
    Piped,
    /// Discard / provide nothing.
    Null,
}

impl From<StdioMode> for Stdio {
    fn from(mode: StdioMode) -> Self {
        match mode {
            StdioMode::Inherit => Self::inherit(),
            StdioMode::Piped => Self::piped(),
            StdioMode::Null => Self::null(),
        }
    }
}

/// Configuration options for running a command.
///
/// Unset stdio modes fall back to the defaults of the execution mode:
/// buffered execution captures stdout and stderr, blocking execution
/// captures both and copies stderr to the parent, streamed execution
/// inherits all three streams.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,

    /// Environment variables to set (merged with current env).
    pub env: HashMap<String, String>,

    /// Environment variables to remove.
    pub env_remove: Vec<String>,

    /// Whether to clear the environment before adding env vars.
    pub env_clear: bool,

    /// Kill the process if it runs longer than this (buffered mode).
    pub timeout: Option<Duration>,

    /// Per-stream capture limit in bytes (buffered mode).
    pub max_buffer: usize,

    pub stdin: Option<StdioMode>,
    pub stdout: Option<StdioMode>,
    pub stderr: Option<StdioMode>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            env_remove: Vec::new(),
            env_clear: false,
            timeout: None,
            max_buffer: DEFAULT_MAX_BUFFER,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Clear the environment before setting variables.
    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Set a timeout for the process.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set the per-stream capture limit.
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }

    pub fn stdin(mut self, mode: StdioMode) -> Self {
        self.stdin = Some(mode);
        self
    }

    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout = Some(mode);
        self
    }

    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr = Some(mode);
        self
    }

    /// Pipe stderr so streamed execution can report it on failure.
    pub fn pipe_stderr(self) -> Self {
        self.stderr(StdioMode::Piped)
    }

    /// Apply working directory and environment to `cmd`.
    pub(crate) fn apply(&self, cmd: &mut Command) {
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        if self.env_clear {
            cmd.env_clear();
        }

        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }
    }

    /// Apply stdio modes, using `default` for any stream left unset.
    pub(crate) fn apply_stdio(&self, cmd: &mut Command, default: StdioMode) {
        cmd.stdin(self.stdin.unwrap_or(default));
        cmd.stdout(self.stdout.unwrap_or(default));
        cmd.stderr(self.stderr.unwrap_or(default));
    }
}
