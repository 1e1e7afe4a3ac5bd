//! Process execution in three modes.
//!
//! - buffered: run a shell command asynchronously and collect its output
//! - blocking: run a shell command on the calling thread
//! - streamed: spawn a program whose output passes straight through
//!
//! Every asynchronous child is registered with a
//! [`ProcessRegistry`](crate::registry::ProcessRegistry) before the caller
//! gets its handle back.

mod blocking;
mod buffered;
mod execution;
mod executor;
mod options;
mod shell;
mod streamed;

pub use buffered::ExecOutput;
pub use execution::{Execution, ProcessOutput};
pub use executor::ProcessExecutor;
pub use options::{ProcessOptions, StdioMode, DEFAULT_MAX_BUFFER};
pub use streamed::SpawnOutcome;
