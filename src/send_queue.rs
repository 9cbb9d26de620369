//! Generic single-worker FIFO send queue.
//!
//! Decouples enqueue from blocking I/O: callers `post` without blocking, a
//! dedicated worker drains items one at a time, in order, invoking the bound
//! action per item. Per-item action failures are logged and discarded; they
//! never stop the queue.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::UnboundedSender<T> ─► Worker Task ─► QueueAction<T>
//! Caller N ─┘
//! ```
//!
//! Cancellation is observed between items, never mid-action: a stop request
//! during an in-progress action lets that action complete first.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Default bound on how long `stop` waits for the worker to drain.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable queue states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Worker is parked waiting for a wake signal.
    Idle,
    /// Worker is processing queued items.
    Draining,
    /// Worker has exited; the queue is terminal.
    Stopped,
}

const STATE_IDLE: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Asynchronous per-item action bound to a queue worker.
///
/// The worker owns the action, so implementations may hold exclusive
/// resources (e.g. a socket write half) without extra locking.
#[async_trait]
pub trait QueueAction<T>: Send {
    /// Process one queued item. Errors are logged by the worker and do not
    /// stop the queue.
    async fn process(&mut self, item: T) -> Result<()>;
}

/// Single-worker, strictly ordered outbound work queue.
pub struct SendQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<AtomicU8>,
}

impl<T: Send + 'static> SendQueue<T> {
    /// Spawn the queue worker with the given action.
    pub fn spawn<A>(action: A) -> Self
    where
        A: QueueAction<T> + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(STATE_IDLE));

        let worker = tokio::spawn(worker_loop(rx, action, cancel.clone(), state.clone()));

        Self {
            tx,
            cancel,
            worker: Mutex::new(Some(worker)),
            state,
        }
    }

    /// Enqueue an item without blocking. Wakes the worker if it is idle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueClosed`] if the worker has stopped.
    pub fn post(&self, item: T) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::QueueClosed);
        }
        self.tx.send(item).map_err(|_| TransportError::QueueClosed)
    }

    /// Current queue state.
    pub fn state(&self) -> QueueState {
        match self.state.load(Ordering::Acquire) {
            STATE_DRAINING => QueueState::Draining,
            STATE_STOPPED => QueueState::Stopped,
            _ => QueueState::Idle,
        }
    }

    /// Token cancelled when the queue stops. Shared with owners that need to
    /// tear down alongside the worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation, then wait (bounded by `timeout`) for the worker
    /// to observe it and exit. After the timeout the stop proceeds anyway;
    /// the drain is best-effort, not a hard failure.
    pub async fn stop(&self, timeout: Duration) {
        self.cancel.cancel();

        let handle = self.worker.lock().expect("queue worker lock").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("send queue worker did not drain within {timeout:?}");
            }
        }
    }
}

async fn worker_loop<T, A>(
    mut rx: mpsc::UnboundedReceiver<T>,
    mut action: A,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
) where
    A: QueueAction<T>,
{
    loop {
        // Park until woken by a post or cancelled.
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break, // all senders dropped
            },
        };

        state.store(STATE_DRAINING, Ordering::Release);
        run_one(&mut action, first).await;

        // Drain everything queued right now, strictly in order.
        loop {
            if cancel.is_cancelled() {
                state.store(STATE_STOPPED, Ordering::Release);
                return;
            }
            match rx.try_recv() {
                Ok(item) => run_one(&mut action, item).await,
                Err(_) => break,
            }
        }

        state.store(STATE_IDLE, Ordering::Release);
    }

    state.store(STATE_STOPPED, Ordering::Release);
}

async fn run_one<T, A: QueueAction<T>>(action: &mut A, item: T) {
    if let Err(e) = action.process(item).await {
        tracing::warn!("send queue action failed: {e}");
    }
}
