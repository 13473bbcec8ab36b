//! Cached, single-flight LibreLinkUp session management.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{AuthError, LibreLinkUpClient};
use crate::events::{EventDispatcher, SyncEvent};

use super::{Credentials, Session, SessionFile};

/// Owns the current LibreLinkUp session.
///
/// All callers go through one async lock, so concurrent requests for a
/// session while a login is in flight wait for it and then reuse the fresh
/// token instead of logging in again.
pub struct SessionManager {
    client: LibreLinkUpClient,
    session: Mutex<Option<Session>>,
    file: Option<SessionFile>,
    default_region: Option<String>,
    events: Option<EventDispatcher>,
    logins: AtomicU64,
}

impl SessionManager {
    pub fn new(client: LibreLinkUpClient) -> Self {
        Self {
            client,
            session: Mutex::new(None),
            file: None,
            default_region: None,
            events: None,
            logins: AtomicU64::new(0),
        }
    }

    /// Persist sessions to `file`, starting from whatever valid session it holds.
    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        match file.load() {
            Ok(Some(session)) => {
                debug!(expires_at = %session.expires_at, "Loaded cached session");
                self.session = Mutex::new(Some(session));
            }
            Ok(None) => debug!("No cached session"),
            Err(e) => warn!(error = %e, "Failed to load session file"),
        }
        self.file = Some(file);
        self
    }

    /// Region to try first when no session carries one
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.default_region = region.filter(|r| !r.is_empty());
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// Number of login exchanges performed so far
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }

    /// Cached session, if any, without refreshing it
    pub async fn current(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    /// Return a usable session for `credentials`, logging in if needed.
    ///
    /// Nightscout credentials never need a session and return `Ok(None)`.
    /// On failure the previously cached session is left in place.
    pub async fn ensure_valid_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Session>, AuthError> {
        let (email, password) = match credentials {
            Credentials::Nightscout { .. } => return Ok(None),
            Credentials::LibreLinkUp { email, password } => (email, password),
        };

        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.email == *email && session.is_valid_at(Utc::now()) {
                return Ok(Some(session.clone()));
            }
        }

        let region = guard
            .as_ref()
            .filter(|s| s.email == *email)
            .and_then(|s| s.region.clone())
            .or_else(|| self.default_region.clone());

        debug!(region = ?region, "Session missing or expired, logging in");
        let session = self.client.login(email, password, region.as_deref()).await?;
        self.logins.fetch_add(1, Ordering::SeqCst);

        if let Some(file) = &self.file {
            if let Err(e) = file.save(&session) {
                warn!(error = %e, "Failed to save session");
            }
        }
        if let Some(events) = &self.events {
            events.send(SyncEvent::SessionUpdated {
                expires_at: session.expires_at,
            });
        }

        *guard = Some(session.clone());
        Ok(Some(session))
    }

    /// Drop the cached session if it still holds `stale_token`.
    ///
    /// A session that another caller already refreshed is kept.
    pub async fn invalidate(&self, stale_token: &str) -> bool {
        let mut guard = self.session.lock().await;
        let matches = guard.as_ref().map(|s| s.token == stale_token).unwrap_or(false);
        if matches {
            info!("Dropping rejected session token");
            *guard = None;
            if let Some(events) = &self.events {
                events.send(SyncEvent::SessionCleared);
            }
        }
        matches
    }

    /// Forget the session, in memory and on disk.
    pub async fn logout(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        *guard = None;
        if let Some(file) = &self.file {
            file.clear()?;
        }
        if let Some(events) = &self.events {
            events.send(SyncEvent::SessionCleared);
        }
        info!("Logged out");
        Ok(())
    }

    /// Install a session obtained elsewhere (tests, imports).
    pub async fn set_session(&self, session: Session) {
        *self.session.lock().await = Some(session);
    }
}
