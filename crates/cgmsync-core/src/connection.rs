//! Connection state tracking for the periodic sync.
//!
//! ```text
//! Disconnected --attempt--> Reconnecting --success--> Connected
//! Connected --interval elapsed without success--> Reconnecting
//! Reconnecting --consecutive failures >= threshold--> Disconnected
//! ```
//!
//! The orchestrator drives transitions; the countdown scheduler reads the
//! status and reports overdue connections.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::{EventDispatcher, SyncEvent};

/// Consecutive failed cycles before a connection counts as lost
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Reconnecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Connection state plus the time of the last successful fetch.
///
/// `last_connection_date == None` means no fetch has succeeded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_connection_date: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ConnectionStatus {
    pub fn on_attempt_started(&mut self) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Reconnecting;
        }
    }

    pub fn on_success(&mut self, at: DateTime<Utc>) {
        self.state = ConnectionState::Connected;
        self.last_connection_date = Some(at);
        self.consecutive_failures = 0;
    }

    pub fn on_failure(&mut self, max_failures: u32) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state = if self.consecutive_failures >= max_failures.max(1) {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Reconnecting
        };
    }

    /// Connected but no success within `interval`: fall back to Reconnecting.
    pub fn on_tick(&mut self, now: DateTime<Utc>, interval: Duration) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(last) = self.last_connection_date {
            if now - last >= interval {
                self.state = ConnectionState::Reconnecting;
            }
        }
    }
}

/// Owner of the shared [`ConnectionStatus`], published on a watch channel.
#[derive(Debug)]
pub struct ConnectionMonitor {
    status: watch::Sender<ConnectionStatus>,
    max_failures: u32,
    events: Option<EventDispatcher>,
}

impl ConnectionMonitor {
    pub fn new(max_failures: u32) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            status,
            max_failures: max_failures.max(1),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn update(&self, transition: impl FnOnce(&mut ConnectionStatus)) {
        let mut changed = None;
        self.status.send_modify(|status| {
            let before = status.state;
            transition(status);
            if before != status.state {
                changed = Some((before, *status));
            }
        });

        if let Some((before, after)) = changed {
            info!(from = %before, to = %after.state, "Connection state changed");
            if let Some(events) = &self.events {
                events.send(SyncEvent::ConnectionChanged {
                    state: after.state,
                    last_connection_date: after.last_connection_date,
                });
            }
        }
    }

    pub fn attempt_started(&self) {
        self.update(ConnectionStatus::on_attempt_started);
    }

    pub fn record_success(&self, at: DateTime<Utc>) {
        self.update(|s| s.on_success(at));
    }

    pub fn record_failure(&self) {
        let max = self.max_failures;
        self.update(|s| s.on_failure(max));
        debug!(failures = self.status().consecutive_failures, "Recorded failed cycle");
    }

    pub fn check_overdue(&self, now: DateTime<Utc>, interval: Duration) {
        self.update(|s| s.on_tick(now, interval));
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }
}
