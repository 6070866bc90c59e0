//! Connection state tracking
//!
//! The connection state is a value object replaced wholesale on every
//! transition and published through a `tokio::sync::watch` channel: new
//! subscribers immediately observe the latest value, and synchronous reads
//! never block. Transitions are atomic — observers only ever see complete
//! snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Immutable snapshot of the connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// A live, handshaken session currently exists
    pub connected: bool,
    /// A session has been successfully established at least once
    pub ever_connected_before: bool,
    /// The current disconnected state was explicitly requested by the
    /// caller, as opposed to a transport failure
    pub intended_disconnect: bool,
}

impl ConnectionState {
    /// State before any connection attempt: disconnected, by intent
    pub fn initial() -> Self {
        Self {
            connected: false,
            ever_connected_before: false,
            intended_disconnect: true,
        }
    }
}

/// Publisher and cache for [`ConnectionState`]
///
/// `ever_connected` is sticky: once a session has been established it stays
/// true for the lifetime of the cell, including across explicit disconnects.
/// Replay after a reconnect does not depend on it; it is informational.
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
    ever_connected: AtomicBool,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            tx: watch::channel(ConnectionState::initial()).0,
            ever_connected: AtomicBool::new(false),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Synchronous convenience read of `connected`
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.tx.borrow().connected
    }

    /// Subscribe to state transitions
    ///
    /// The receiver starts out holding the latest published value.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// A session finished its handshake
    pub fn publish_connected(&self) {
        let ever = self.ever_connected.load(Ordering::Acquire);
        self.publish(ConnectionState {
            connected: true,
            ever_connected_before: ever,
            intended_disconnect: false,
        });
        self.ever_connected.store(true, Ordering::Release);
    }

    /// The session dropped without the caller asking for it
    ///
    /// Only publishes when transitioning out of `connected`; repeated failed
    /// connect attempts do not republish an unchanged disconnected state.
    pub fn publish_dropped(&self) {
        if !self.is_connected() {
            return;
        }
        self.publish(ConnectionState {
            connected: false,
            ever_connected_before: self.ever_connected.load(Ordering::Acquire),
            intended_disconnect: false,
        });
    }

    /// The caller explicitly disconnected
    pub fn publish_intended_disconnect(&self) {
        self.publish(ConnectionState {
            connected: false,
            ever_connected_before: self.ever_connected.load(Ordering::Acquire),
            intended_disconnect: true,
        });
    }

    fn publish(&self, next: ConnectionState) {
        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
