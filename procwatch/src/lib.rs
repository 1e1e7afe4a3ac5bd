//! Procwatch - run child processes and know when they have all exited.
//!
//! Commands run in one of three modes (buffered, blocking, streamed). Every
//! asynchronous child is counted by a shared [`ProcessRegistry`], which
//! notifies subscribers each time the count of live children returns to
//! zero. Hosts use that to decide when delegated work is done.

pub mod cli;
pub mod error;
pub mod logging;
pub mod process;
pub mod registry;

pub use error::{ExitKind, OutputStream, ProcessExecutionError};
pub use process::{
    ExecOutput, Execution, ProcessExecutor, ProcessOptions, ProcessOutput, SpawnOutcome,
    StdioMode,
};
pub use registry::{LiveSlot, ProcessRegistry, RegisteredChild, SubscriptionId};
