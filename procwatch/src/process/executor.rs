//! Entry points for running commands.

use super::blocking;
use super::buffered::{self, ExecOutput};
use super::execution::Execution;
use super::options::ProcessOptions;
use super::streamed::{self, SpawnOutcome};
use crate::error::ProcessExecutionError;
use crate::registry::ProcessRegistry;

/// Runs commands and registers every asynchronous child with a shared
/// [`ProcessRegistry`].
///
/// # Example
///
/// ```rust,no_run
/// use procwatch::{ProcessExecutor, ProcessOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let executor = ProcessExecutor::default();
///
///     let build = executor.exec("cargo build", &ProcessOptions::new());
///     let lint = executor.spawn("cargo", &["clippy".to_string()], &ProcessOptions::new());
///
///     // Everything spawned above is tracked until it exits.
///     executor.registry().wait_for_quiescence().await;
///
///     println!("build ok: {}", build.wait().await?.success());
///     println!("lint ok: {}", lint.wait().await?.success());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    registry: ProcessRegistry,
}

impl ProcessExecutor {
    pub const fn new(registry: ProcessRegistry) -> Self {
        Self { registry }
    }

    /// The registry children are tracked in.
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run `command` through the shell, buffering stdout and stderr.
    ///
    /// Never fails directly: spawn failures, abnormal exits, timeouts and
    /// buffer overflows all arrive in [`ExecOutput::error`].
    pub fn exec(&self, command: &str, options: &ProcessOptions) -> Execution<ExecOutput> {
        buffered::exec(&self.registry, command, options)
    }

    /// Callback form of [`exec`](Self::exec): `callback(error, stdout)`.
    pub fn exec_with<F>(&self, command: &str, options: &ProcessOptions, callback: F)
    where
        F: FnOnce(Option<String>, String) + Send + 'static,
    {
        self.exec(command, options).on_complete(|output| {
            let error = output.error_message();
            callback(error, output.stdout);
        });
    }

    /// Run `command` through the shell on the calling thread and return
    /// its trimmed stdout. The child is not registered.
    ///
    /// Kept as a method so all three modes hang off the executor, even
    /// though a blocking run never touches the registry.
    #[allow(clippy::unused_self)]
    pub fn exec_sync(
        &self,
        command: &str,
        options: &ProcessOptions,
    ) -> Result<String, ProcessExecutionError> {
        blocking::exec_sync(command, options)
    }

    /// Spawn `program` with `args`, inheriting the parent's streams unless
    /// `options` says otherwise.
    pub fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: &ProcessOptions,
    ) -> Execution<SpawnOutcome> {
        streamed::spawn(&self.registry, program, args, options)
    }

    /// Callback form of [`spawn`](Self::spawn): `callback(failure_reason)`.
    pub fn spawn_with<F>(&self, program: &str, args: &[String], options: &ProcessOptions, callback: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        self.spawn(program, args, options)
            .on_complete(|outcome| callback(outcome.failure));
    }
}
