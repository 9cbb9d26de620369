//! Connection lifecycle and idempotent disconnect coordination.
//!
//! Each pipeline half (sender, receiver) owns one [`DisconnectCoordinator`].
//! The coordinator enforces the single-use lifecycle
//! `New → Connected → Disconnecting → Done` and guarantees the disconnect
//! notice fires at most once, no matter how many callers race into
//! `disconnect`.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Notice emitted exactly once when a pipeline half disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectNotice {
    /// Captured reason, empty when none was given.
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    New,
    Connected,
    Disconnecting,
    Done,
}

/// Idempotent teardown guard shared by the sender and receiver halves.
pub struct DisconnectCoordinator {
    state: Mutex<LinkState>,
    notice_tx: mpsc::UnboundedSender<DisconnectNotice>,
    cancel: CancellationToken,
}

impl DisconnectCoordinator {
    /// Create a coordinator and the receiver for its (single) disconnect
    /// notice.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DisconnectNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Self {
            state: Mutex::new(LinkState::New),
            notice_tx,
            cancel: CancellationToken::new(),
        });
        (coordinator, notice_rx)
    }

    /// Transition `New → Connected`.
    ///
    /// # Errors
    ///
    /// [`TransportError::AlreadyConnected`] for any other state, including
    /// after a disconnect; connection objects are never reused.
    pub fn mark_connected(&self) -> Result<()> {
        let mut state = self.state.lock().expect("link state lock");
        if *state != LinkState::New {
            return Err(TransportError::AlreadyConnected);
        }
        *state = LinkState::Connected;
        Ok(())
    }

    /// Whether the half is currently connected.
    pub fn is_connected(&self) -> bool {
        *self.state.lock().expect("link state lock") == LinkState::Connected
    }

    /// Token cancelled when disconnect begins. The owning worker observes it,
    /// exits, and drops its socket half (close-time errors are swallowed by
    /// the drop).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear down the connection. Only the first call out of any number of
    /// concurrent/duplicate calls performs the close and fires the notice;
    /// the rest are no-ops. Returns whether this call performed the close.
    pub fn disconnect(&self, reason: Option<String>) -> bool {
        {
            let mut state = self.state.lock().expect("link state lock");
            match *state {
                LinkState::Connected => *state = LinkState::Disconnecting,
                // Never connected, already disconnecting, or done.
                _ => return false,
            }
        }

        self.cancel.cancel();

        {
            let mut state = self.state.lock().expect("link state lock");
            *state = LinkState::Done;
        }

        let notice = DisconnectNotice {
            reason: reason.unwrap_or_default(),
        };
        // Receiver may be gone; the notice is best-effort delivery.
        let _ = self.notice_tx.send(notice);
        true
    }
}
