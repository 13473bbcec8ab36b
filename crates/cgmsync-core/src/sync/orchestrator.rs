//! Ties sessions, fetching, history and connection state into sync cycles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::{FetchAuth, FetchError, ReadingFetcher};
use crate::auth::{Credentials, Session, SessionManager};
use crate::cache::{CacheManager, HistoryStore};
use crate::connection::ConnectionMonitor;
use crate::events::{EventDispatcher, SyncEvent};
use crate::models::{Backend, GlucoseReading};

use super::SyncError;

const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Readings were fetched and merged into history
    Merged { fetched: usize, inserted: usize },
    /// Another cycle for the same backend was already running
    Skipped,
}

/// Clears a backend's in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    fetcher: ReadingFetcher,
    sessions: Arc<SessionManager>,
    history: Arc<HistoryStore>,
    monitor: Arc<ConnectionMonitor>,
    events: EventDispatcher,
    cache: Option<CacheManager>,
    credentials: RwLock<HashMap<Backend, Credentials>>,
    nightscout_in_flight: AtomicBool,
    libre_link_up_in_flight: AtomicBool,
    last_error: watch::Sender<Option<String>>,
    fetch_timeout: Duration,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: ReadingFetcher,
        sessions: Arc<SessionManager>,
        history: Arc<HistoryStore>,
        monitor: Arc<ConnectionMonitor>,
    ) -> Self {
        let (last_error, _) = watch::channel(None);
        Self {
            fetcher,
            sessions,
            history,
            monitor,
            events: EventDispatcher::default(),
            cache: None,
            credentials: RwLock::new(HashMap::new()),
            nightscout_in_flight: AtomicBool::new(false),
            libre_link_up_in_flight: AtomicBool::new(false),
            last_error,
            fetch_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Save each backend's history here after merges that add readings
    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials
            .get_mut()
            .insert(credentials.backend(), credentials);
        self
    }

    /// Upper bound on one cycle, login and retry included
    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Short message from the last failed cycle, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    pub async fn set_credentials(&self, credentials: Credentials) {
        let backend = credentials.backend();
        self.credentials.write().await.insert(backend, credentials);
        debug!(backend = %backend, "Credentials updated");
    }

    pub async fn clear_credentials(&self, backend: Backend) {
        self.credentials.write().await.remove(&backend);
    }

    pub fn is_in_flight(&self, backend: Backend) -> bool {
        self.in_flight_flag(backend).load(Ordering::Acquire)
    }

    /// Cancel every running and future cycle.
    pub fn shutdown(&self) {
        info!("Shutting down sync");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn in_flight_flag(&self, backend: Backend) -> &AtomicBool {
        match backend {
            Backend::Nightscout => &self.nightscout_in_flight,
            Backend::LibreLinkUp => &self.libre_link_up_in_flight,
        }
    }

    /// Load `backend`'s cached history into the store without publishing events.
    ///
    /// Returns the number of readings restored.
    pub async fn restore_history(&self, backend: Backend) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        match cache.load_history(backend) {
            Ok(Some(cached)) => {
                let age = cached.age_display();
                let result = self.history.merge(backend, cached.data).await;
                debug!(backend = %backend, restored = result.inserted, age = %age, "Restored history");
                result.inserted
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(backend = %backend, error = %e, "Failed to load cached history");
                0
            }
        }
    }

    /// One sync cycle: ensure session, fetch, merge, record success.
    pub async fn run_cycle(&self, backend: Backend) -> Result<CycleOutcome, SyncError> {
        self.run_cycle_until(backend, &self.cancel).await
    }

    async fn run_cycle_until(
        &self,
        backend: Backend,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let Some(_in_flight) = InFlight::acquire(self.in_flight_flag(backend)) else {
            debug!(backend = %backend, "Cycle already running, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let credentials = self.credentials.read().await.get(&backend).cloned();
        let Some(credentials) = credentials else {
            // No attempt was made, so connection state stays as it is
            let err = SyncError::MissingCredentials(backend);
            warn!(backend = %backend, "No credentials configured");
            self.publish_error(backend, &err);
            return Err(err);
        };

        self.monitor.attempt_started();

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(backend = %backend, "Cycle cancelled during fetch");
                return Err(SyncError::Cancelled);
            }
            result = timeout(self.fetch_timeout, self.fetch_with_refresh(backend, &credentials)) => {
                result.unwrap_or(Err(SyncError::Fetch(FetchError::Timeout)))
            }
        };

        let readings = match fetched {
            Ok(readings) => readings,
            Err(e) => {
                if !cancel.is_cancelled() {
                    self.report_failure(backend, &e);
                }
                return Err(e);
            }
        };
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let fetched = readings.len();
        let merge = self.history.merge(backend, readings).await;
        self.monitor.record_success(Utc::now());
        self.last_error.send_replace(None);

        if merge.inserted > 0 {
            self.events.send(SyncEvent::HistoryMerged {
                backend,
                inserted: merge.inserted,
                total: merge.total,
                generation: merge.generation,
            });
            self.persist(backend).await;
        }

        info!(backend = %backend, fetched, inserted = merge.inserted, total = merge.total, "Sync cycle complete");
        Ok(CycleOutcome::Merged {
            fetched,
            inserted: merge.inserted,
        })
    }

    /// Fetch with one re-login if LibreLinkUp rejects the session.
    async fn fetch_with_refresh(
        &self,
        backend: Backend,
        credentials: &Credentials,
    ) -> Result<Vec<GlucoseReading>, SyncError> {
        if let Credentials::Nightscout { .. } = credentials {
            return Ok(self
                .fetcher
                .fetch_latest(backend, FetchAuth::Credentials(credentials))
                .await?);
        }

        let session = self.require_session(credentials).await?;
        match self
            .fetcher
            .fetch_latest(backend, FetchAuth::Session(&session))
            .await
        {
            Err(FetchError::Unauthorized) => {
                warn!(backend = %backend, "Session rejected, logging in again");
                self.sessions.invalidate(&session.token).await;
                let fresh = self.require_session(credentials).await?;
                Ok(self
                    .fetcher
                    .fetch_latest(backend, FetchAuth::Session(&fresh))
                    .await?)
            }
            other => Ok(other?),
        }
    }

    async fn require_session(&self, credentials: &Credentials) -> Result<Session, SyncError> {
        self.sessions
            .ensure_valid_session(credentials)
            .await?
            .ok_or(SyncError::Fetch(FetchError::Unauthorized))
    }

    fn report_failure(&self, backend: Backend, err: &SyncError) {
        warn!(backend = %backend, error = %err, "Sync cycle failed");
        self.monitor.record_failure();
        self.publish_error(backend, err);
    }

    fn publish_error(&self, backend: Backend, err: &SyncError) {
        let message = err.user_message();
        self.last_error.send_replace(Some(message.clone()));
        self.events.send(SyncEvent::Error { backend, message });
    }

    async fn persist(&self, backend: Backend) {
        let Some(cache) = &self.cache else {
            return;
        };
        let snapshot = self.history.snapshot(backend).await;
        if let Err(e) = cache.save_history(backend, &snapshot) {
            warn!(backend = %backend, error = %e, "Failed to save history cache");
        }
    }

    /// Run a cycle for `backend` now and then every `every` until stopped.
    ///
    /// `every` is rounded up to at least a second.
    ///
    /// Each tick spawns its cycle as a separate task, so a slow fetch never
    /// delays the timer; ticks that land while a cycle is running are
    /// skipped by that cycle's in-flight check.
    pub fn start(self: &Arc<Self>, backend: Backend, every: Duration) -> SyncHandle {
        let token = self.cancel.child_token();
        let trigger = Arc::new(Notify::new());
        let orchestrator = Arc::clone(self);
        let driver_token = token.clone();
        let driver_trigger = Arc::clone(&trigger);
        let every = every.max(MIN_SYNC_INTERVAL);

        let task = tokio::spawn(async move {
            info!(backend = %backend, interval_secs = every.as_secs(), "Starting periodic sync");
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cycles = JoinSet::new();

            loop {
                tokio::select! {
                    _ = driver_token.cancelled() => break,
                    Some(_) = cycles.join_next(), if !cycles.is_empty() => continue,
                    _ = ticker.tick() => {}
                    _ = driver_trigger.notified() => debug!(backend = %backend, "Manual sync requested"),
                }

                let orchestrator = Arc::clone(&orchestrator);
                let cycle_token = driver_token.clone();
                cycles.spawn(async move {
                    match orchestrator.run_cycle_until(backend, &cycle_token).await {
                        Ok(outcome) => debug!(backend = %backend, ?outcome, "Cycle finished"),
                        Err(e) if e.is_cancelled() => debug!(backend = %backend, "Cycle cancelled"),
                        // Already logged and reported
                        Err(_) => {}
                    }
                });
            }

            while cycles.join_next().await.is_some() {}
            info!(backend = %backend, "Periodic sync stopped");
        });

        SyncHandle {
            token,
            trigger,
            task: Some(task),
        }
    }
}

/// Control handle for a running periodic sync.
///
/// Dropping the handle stops the driver without waiting for it.
pub struct SyncHandle {
    token: CancellationToken,
    trigger: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Run a cycle now instead of waiting for the next tick
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Cancel the driver and its in-flight cycles, then wait for them.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync driver ended abnormally");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
