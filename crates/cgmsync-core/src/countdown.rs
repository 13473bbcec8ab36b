//! Seconds until the next expected reading.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{ConnectionMonitor, ConnectionState, ConnectionStatus};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Countdown {
    pub seconds: u64,
    pub state: ConnectionState,
}

impl Countdown {
    /// Countdown for `status` at `now`, always within `[0, interval_secs]`.
    ///
    /// Disconnected or never connected counts as 0.
    pub fn compute(status: &ConnectionStatus, interval_secs: u64, now: DateTime<Utc>) -> Self {
        let seconds = match status.last_connection_date {
            Some(last) if status.state != ConnectionState::Disconnected => {
                let interval = i64::try_from(interval_secs).unwrap_or(i64::MAX);
                let elapsed = (now - last).num_seconds();
                // Clock skew puts `last` in the future; clamp to a full interval
                u64::try_from(interval.saturating_sub(elapsed).clamp(0, interval)).unwrap_or(0)
            }
            _ => 0,
        };
        Self {
            seconds,
            state: status.state,
        }
    }

    /// Label next to the connection status: `"{n} s"` or `"..."`.
    pub fn display(&self) -> String {
        let show = self.state != ConnectionState::Disconnected
            && (self.seconds > 0 || self.state == ConnectionState::Reconnecting);
        if show {
            format!("{} s", self.seconds)
        } else {
            "...".to_string()
        }
    }
}

/// Recomputes the countdown once a second while started.
///
/// Each tick also tells the monitor when a Connected backend has gone a
/// full interval without a reading.
pub struct CountdownScheduler {
    monitor: Arc<ConnectionMonitor>,
    interval_secs: u64,
    tx: watch::Sender<Countdown>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl CountdownScheduler {
    pub fn new(monitor: Arc<ConnectionMonitor>, reading_interval: Duration) -> Self {
        let interval_secs = reading_interval.as_secs().max(1);
        let initial = Countdown::compute(&monitor.status(), interval_secs, Utc::now());
        let (tx, _) = watch::channel(initial);
        Self {
            monitor,
            interval_secs,
            tx,
            running: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Countdown> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Countdown {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|(_, handle)| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start ticking. Calling it while already running does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = Arc::clone(&self.monitor);
        let tx = self.tx.clone();
        let interval_secs = self.interval_secs;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick(&monitor, &tx, interval_secs, Utc::now()),
                }
            }
            debug!("Countdown stopped");
        });

        debug!(interval_secs, "Countdown started");
        self.running = Some((cancel, handle));
    }

    /// Stop ticking and wait for the task to exit.
    pub async fn stop(&mut self) {
        if let Some((cancel, handle)) = self.running.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }
}

impl Drop for CountdownScheduler {
    fn drop(&mut self) {
        if let Some((cancel, _)) = &self.running {
            cancel.cancel();
        }
    }
}

fn tick(
    monitor: &ConnectionMonitor,
    tx: &watch::Sender<Countdown>,
    interval_secs: u64,
    now: DateTime<Utc>,
) {
    let interval = chrono::Duration::seconds(i64::try_from(interval_secs).unwrap_or(i64::MAX));
    monitor.check_overdue(now, interval);
    let next = Countdown::compute(&monitor.status(), interval_secs, now);
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: ConnectionState, last: Option<DateTime<Utc>>) -> ConnectionStatus {
        ConnectionStatus {
            state,
            last_connection_date: last,
            consecutive_failures: 0,
        }
    }

    #[test]
    fn test_half_interval_elapsed() {
        let now = Utc::now();
        let s = status(ConnectionState::Connected, Some(now - chrono::Duration::seconds(30)));
        let c = Countdown::compute(&s, 60, now);
        assert_eq!(c.seconds, 30);
        assert_eq!(c.display(), "30 s");
    }

    #[test]
    fn test_bounds() {
        let now = Utc::now();
        let overdue = status(ConnectionState::Connected, Some(now - chrono::Duration::seconds(500)));
        assert_eq!(Countdown::compute(&overdue, 60, now).seconds, 0);

        let future = status(ConnectionState::Connected, Some(now + chrono::Duration::seconds(500)));
        assert_eq!(Countdown::compute(&future, 60, now).seconds, 60);

        for offset in [-10i64, 0, 1, 59, 60, 61, 3600] {
            let s = status(
                ConnectionState::Reconnecting,
                Some(now - chrono::Duration::seconds(offset)),
            );
            assert!(Countdown::compute(&s, 60, now).seconds <= 60);
        }
    }

    #[test]
    fn test_disconnected_or_never_connected_is_zero() {
        let now = Utc::now();
        let never = status(ConnectionState::Reconnecting, None);
        assert_eq!(Countdown::compute(&never, 300, now).seconds, 0);

        let lost = status(ConnectionState::Disconnected, Some(now));
        let c = Countdown::compute(&lost, 300, now);
        assert_eq!(c.seconds, 0);
        assert_eq!(c.display(), "...");
    }

    #[test]
    fn test_display_rule() {
        let c = Countdown {
            seconds: 0,
            state: ConnectionState::Reconnecting,
        };
        assert_eq!(c.display(), "0 s");
        let c = Countdown {
            seconds: 0,
            state: ConnectionState::Connected,
        };
        assert_eq!(c.display(), "...");
        let c = Countdown {
            seconds: 12,
            state: ConnectionState::Disconnected,
        };
        assert_eq!(c.display(), "...");
    }

    #[tokio::test]
    async fn test_scheduler_publishes_countdown() {
        let monitor = Arc::new(ConnectionMonitor::default());
        monitor.record_success(Utc::now() - chrono::Duration::seconds(30));

        let mut scheduler = CountdownScheduler::new(Arc::clone(&monitor), Duration::from_secs(60));
        assert!(!scheduler.is_running());
        scheduler.start();
        assert!(scheduler.is_running());

        let mut rx = scheduler.subscribe();
        let value = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let c = *rx.borrow_and_update();
                if c.state == ConnectionState::Connected && c.seconds <= 30 {
                    return c;
                }
                rx.changed().await.expect("scheduler alive");
            }
        })
        .await
        .expect("countdown published");
        assert!((28..=30).contains(&value.seconds));

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_tick_marks_overdue_connection() {
        let monitor = ConnectionMonitor::default();
        let now = Utc::now();
        monitor.record_success(now - chrono::Duration::seconds(120));
        let (tx, rx) = watch::channel(Countdown::default());

        tick(&monitor, &tx, 60, now);

        assert_eq!(monitor.state(), ConnectionState::Reconnecting);
        let c = *rx.borrow();
        assert_eq!(c.seconds, 0);
        assert_eq!(c.display(), "0 s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let monitor = Arc::new(ConnectionMonitor::default());
        let mut scheduler = CountdownScheduler::new(monitor, Duration::from_secs(300));
        scheduler.start();
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(scheduler.is_running());
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }
}
