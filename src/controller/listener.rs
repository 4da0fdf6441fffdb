//! Ownership of the single microphone-using background task.
//!
//! [`ListenerManager::start`] always stops the previous listener and waits
//! for its task to exit before spawning the next one, so at most one
//! [`ListenerHandle`] is ever in the running state.

use crate::session::Mode;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancellation token plus running flag for one listener task.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    mode: Mode,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl ListenerHandle {
    fn new(id: u64, mode: Mode) -> Self {
        Self {
            id,
            mode,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Generation id, unique per manager.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True from spawn until the task body returns.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Clears the running flag and decrements the shared counter on drop, which
/// also covers tasks that panic or are dropped before first poll.
struct RunningGuard {
    flag: Arc<AtomicBool>,
    count: Arc<AtomicUsize>,
}

impl RunningGuard {
    fn enter(flag: Arc<AtomicBool>, count: Arc<AtomicUsize>) -> Self {
        flag.store(true, Ordering::SeqCst);
        count.fetch_add(1, Ordering::SeqCst);
        Self { flag, count }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ActiveListener {
    handle: ListenerHandle,
    task: JoinHandle<()>,
}

/// Starts and stops listener tasks one at a time.
pub struct ListenerManager {
    active: Option<ActiveListener>,
    running: Arc<AtomicUsize>,
    next_id: u64,
}

impl Default for ListenerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerManager {
    pub fn new() -> Self {
        Self {
            active: None,
            running: Arc::new(AtomicUsize::new(0)),
            next_id: 0,
        }
    }

    /// Stop the current listener (waiting for it to exit), then spawn
    /// `loop_fn` as the new one.
    pub async fn start<F, Fut>(&mut self, mode: Mode, loop_fn: F) -> ListenerHandle
    where
        F: FnOnce(ListenerHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop_and_wait().await;

        self.next_id += 1;
        let handle = ListenerHandle::new(self.next_id, mode);
        let guard = RunningGuard::enter(Arc::clone(&handle.running), Arc::clone(&self.running));
        let body = loop_fn(handle.clone());
        let task = tokio::spawn(async move {
            let _guard = guard;
            body.await;
        });

        info!(id = handle.id, %mode, "listener started");
        self.active = Some(ActiveListener {
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Request cancellation. Does not interrupt an in-flight listen; the task
    /// notices at its next step boundary.
    pub fn stop(&self, handle: &ListenerHandle) {
        debug!(id = handle.id, "listener stop requested");
        handle.cancel.cancel();
    }

    /// Cancel the active listener, if any, and wait for its task to exit.
    pub async fn stop_and_wait(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.stop(&active.handle);
        match active.task.await {
            Ok(()) => debug!(id = active.handle.id, "listener exited"),
            Err(e) => warn!(id = active.handle.id, "listener task failed: {e}"),
        }
    }

    /// The most recently started listener, running or not.
    #[must_use]
    pub fn active(&self) -> Option<&ListenerHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    /// Whether `id` names the most recently started listener.
    #[must_use]
    pub fn is_current(&self, id: u64) -> bool {
        self.active().is_some_and(|h| h.id == id)
    }

    /// Number of listener tasks whose body is still running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared counter behind [`running_count`](Self::running_count), readable
    /// without going through the owner.
    #[must_use]
    pub fn running_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.running)
    }
}
