use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// A time-bounded LibreLinkUp authentication token.
///
/// A session is usable while `now < expires_at`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Account the session was issued for
    pub email: String,
    /// LibreLinkUp user id, when the login response carried one
    #[serde(default)]
    pub account_id: Option<String>,
    /// Regional API the account lives on after a login redirect
    #[serde(default)]
    pub region: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>, email: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at,
            email: email.into(),
            account_id: None,
            region: None,
        }
    }

    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    /// SHA-256 hex digest of the account id, sent as the `account-id` header.
    pub fn account_id_hash(&self) -> Option<String> {
        self.account_id
            .as_deref()
            .map(|id| hex::encode(Sha256::digest(id.as_bytes())))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .field("region", &self.region)
            .finish()
    }
}

/// On-disk copy of the current session so restarts inside the validity
/// window skip the login exchange.
#[derive(Debug, Clone)]
pub struct SessionFile {
    cache_dir: PathBuf,
}

impl SessionFile {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load a session from disk. Expired sessions are ignored.
    pub fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: Session =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if session.is_expired() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Save session to disk
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    /// Delete the session file if present
    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}
