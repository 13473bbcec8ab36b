//! Sync event system for session, history and connection notifications.
//!
//! Core components publish state changes here instead of mutating shared
//! observable objects; front ends subscribe and redraw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::models::Backend;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Events emitted by the sync core.
///
/// All events are serializable for logging and IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[non_exhaustive]
pub enum SyncEvent {
    /// A new LibreLinkUp session was stored.
    SessionUpdated { expires_at: DateTime<Utc> },
    /// The cached session was dropped (logout or rejected token).
    SessionCleared,
    /// New readings were merged into a backend's history.
    HistoryMerged {
        backend: Backend,
        inserted: usize,
        total: usize,
        generation: u64,
    },
    /// Connection state changed.
    ConnectionChanged {
        state: ConnectionState,
        last_connection_date: Option<DateTime<Utc>>,
    },
    /// A sync cycle failed.
    Error { backend: Backend, message: String },
}

/// Sender for sync events.
pub type EventSender = broadcast::Sender<SyncEvent>;

/// Receiver for sync events.
pub type EventReceiver = broadcast::Receiver<SyncEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn send(&self, event: SyncEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
