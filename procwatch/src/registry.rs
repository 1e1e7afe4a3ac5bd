//! Live child-process accounting.
//!
//! A [`ProcessRegistry`] counts the children spawned through it and tells
//! subscribers every time that count drops back to zero. Hosts use it to
//! decide when all delegated work is done, typically right before exit.
//!
//! The registry is an explicitly owned handle: clone it into every call
//! site that spawns work. All clones share the same count.

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{broadcast, oneshot, Notify};
use tracing::debug;

/// Identifier returned by [`ProcessRegistry::on_quiescence`].
pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    live: AtomicUsize,
    next_subscription: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    quiescence: broadcast::Sender<()>,
}

impl Inner {
    fn acquire(&self) -> usize {
        self.live.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) {
        let previous = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "live child count underflow");

        if previous == 1 {
            self.notify_quiescence();
        }
    }

    fn notify_quiescence(&self) {
        debug!("all tracked child processes have exited");

        // Snapshot so callbacks may subscribe or unsubscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback();
        }

        // No receivers is fine.
        let _ = self.quiescence.send(());
    }
}

/// Shared count of live child processes plus quiescence notifications.
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<Inner>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (quiescence, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                live: AtomicUsize::new(0),
                next_subscription: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
                quiescence,
            }),
        }
    }

    /// Register a freshly spawned child.
    ///
    /// The count is incremented before this returns. A watcher task takes
    /// ownership of the child, waits for its terminal event and then
    /// decrements the count, firing the quiescence notification if the
    /// count reached zero. The piped stdio handles are moved onto the
    /// returned [`RegisteredChild`] for the caller to wire up.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, mut child: Child) -> RegisteredChild {
        let slot = self.track();
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let kill = KillSwitch::default();
        let requested = kill.clone();
        let (exit_tx, exit_rx) = oneshot::channel();

        debug!(?pid, live = self.live_count(), "registered child process");

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = requested.requested() => {
                    if let Err(e) = child.start_kill() {
                        debug!(?pid, error = %e, "kill request on exited child");
                    }
                    child.wait().await
                }
            };

            debug!(?pid, ?status, "child process exited");
            drop(slot);
            let _ = exit_tx.send(status);
        });

        RegisteredChild {
            pid,
            stdin,
            stdout,
            stderr,
            exit: exit_rx,
            kill,
        }
    }

    /// Count a unit of work the caller supervises itself.
    ///
    /// The count stays incremented until the returned slot is dropped.
    pub fn track(&self) -> LiveSlot {
        self.inner.acquire();
        LiveSlot {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of registered children whose terminal event has not fired.
    pub fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Whether no registered child is currently running.
    pub fn is_quiescent(&self) -> bool {
        self.live_count() == 0
    }

    /// Invoke `callback` every time the live count transitions to zero.
    pub fn on_quiescence<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback added with [`on_quiescence`](Self::on_quiescence).
    ///
    /// Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Receiver that yields one message per zero crossing.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.quiescence.subscribe()
    }

    /// Resolve once no registered child is running.
    ///
    /// Returns immediately if the registry is already quiescent.
    pub async fn wait_for_quiescence(&self) {
        let mut rx = self.subscribe();
        while !self.is_quiescent() {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                // The sender lives as long as `self`.
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("live", &self.live_count())
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

/// One counted unit of live work. Dropping it releases the count.
#[must_use = "dropping a LiveSlot immediately releases it"]
pub struct LiveSlot {
    inner: Arc<Inner>,
}

impl fmt::Debug for LiveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSlot").finish_non_exhaustive()
    }
}

impl Drop for LiveSlot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Requests termination of a registered child.
///
/// Crate-internal: buffered execution uses it for overflow and timeout kills.
#[derive(Debug, Clone, Default)]
pub(crate) struct KillSwitch {
    notify: Arc<Notify>,
}

impl KillSwitch {
    /// Ask the watcher to kill the child. Idempotent.
    pub(crate) fn trigger(&self) {
        self.notify.notify_one();
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// A child owned by the registry's watcher task.
///
/// The stdio fields mirror [`tokio::process::Child`]: they are `Some` only
/// for streams configured as piped.
#[derive(Debug)]
pub struct RegisteredChild {
    /// OS process id, if the child had not already been reaped.
    pub pid: Option<u32>,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
    exit: oneshot::Receiver<io::Result<ExitStatus>>,
    kill: KillSwitch,
}

impl RegisteredChild {
    /// Handle that can kill this child from elsewhere.
    pub(crate) fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    /// Wait for the terminal event.
    ///
    /// By the time this resolves the registry count no longer includes
    /// this child.
    pub async fn wait(self) -> io::Result<ExitStatus> {
        self.exit
            .await
            .map_err(|_| io::Error::other("child watcher stopped before exit"))?
    }
}
