//! Completion handle shared by the asynchronous execution modes.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Output forwarded from a streamed child with piped streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    /// One line from stdout, without its terminator.
    Stdout(String),
    /// A chunk of stderr as it arrived.
    Stderr(String),
}

/// Handle to an in-flight execution.
///
/// The child (if one could be created) is already registered when this is
/// handed out. The result is delivered exactly once, either to
/// [`wait`](Self::wait) or to a callback via
/// [`on_complete`](Self::on_complete).
#[derive(Debug)]
pub struct Execution<T> {
    /// OS process id, `None` if the process could not be spawned.
    pub pid: Option<u32>,

    output: Option<mpsc::Receiver<ProcessOutput>>,

    result_rx: oneshot::Receiver<T>,
}

impl<T: Send + 'static> Execution<T> {
    pub(crate) const fn new(
        pid: Option<u32>,
        result_rx: oneshot::Receiver<T>,
        output: Option<mpsc::Receiver<ProcessOutput>>,
    ) -> Self {
        Self {
            pid,
            output,
            result_rx,
        }
    }

    /// An execution that is already complete.
    pub(crate) fn ready(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self::new(None, rx, None)
    }

    /// Take the receiver for forwarded output, if the mode provides one.
    ///
    /// Reading it is optional. Output that arrives while the channel is
    /// full is dropped rather than held back.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<ProcessOutput>> {
        self.output.take()
    }

    /// Wait for the execution to complete and get the result.
    pub async fn wait(self) -> Result<T> {
        self.result_rx
            .await
            .context("Execution task was dropped before completion")
    }

    /// Deliver the result to `callback` on a background task.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let result_rx = self.result_rx;
        tokio::spawn(async move {
            if let Ok(value) = result_rx.await {
                callback(value);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_resolves() {
        let execution = Execution::ready(7_u32);
        assert!(execution.pid.is_none());
        assert_eq!(execution.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_sender_is_error() {
        let (tx, rx) = oneshot::channel::<u32>();
        drop(tx);
        let execution = Execution::new(Some(1), rx, None);
        assert!(execution.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_on_complete_invokes_callback_once() {
        let (tx, rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let handle = Execution::new(None, rx, None).on_complete(move |value: String| {
            let _ = done_tx.send(value);
        });

        tx.send("finished".to_string()).unwrap();
        handle.await.unwrap();
        assert_eq!(done_rx.await.unwrap(), "finished");
    }
}
