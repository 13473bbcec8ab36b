//! Application configuration management.
//!
//! Configuration is stored at `~/.config/cgmsync/config.json`. Secrets
//! (Nightscout token, LibreLinkUp password) are never written there; they
//! come from the environment or the OS keychain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::nightscout::DEFAULT_ENTRY_COUNT;
use crate::auth::{CredentialStore, Credentials, Session};
use crate::connection::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use crate::models::Backend;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "cgmsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_READING_INTERVAL_MINUTES: u64 = 5;

pub const NIGHTSCOUT_SITE_ENV: &str = "CGMSYNC_NIGHTSCOUT_SITE";
pub const NIGHTSCOUT_TOKEN_ENV: &str = "CGMSYNC_NIGHTSCOUT_TOKEN";
pub const LIBRELINKUP_EMAIL_ENV: &str = "CGMSYNC_LIBRELINKUP_EMAIL";
pub const LIBRELINKUP_PASSWORD_ENV: &str = "CGMSYNC_LIBRELINKUP_PASSWORD";

/// Holds secrets in memory, so there is no `Debug` impl.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Last selected backend
    pub service: Backend,
    pub nightscout_site: Option<String>,
    #[serde(skip)]
    pub nightscout_token: Option<String>,
    pub nightscout_count: usize,
    pub libre_link_up_email: Option<String>,
    #[serde(skip)]
    pub libre_link_up_password: Option<String>,
    /// Expiry of the stored LibreLinkUp session, epoch seconds
    pub libre_link_up_token_expires: Option<i64>,
    pub libre_link_up_region: Option<String>,
    pub reading_interval_minutes: u64,
    pub fetch_timeout_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: Backend::default(),
            nightscout_site: None,
            nightscout_token: None,
            nightscout_count: DEFAULT_ENTRY_COUNT,
            libre_link_up_email: None,
            libre_link_up_password: None,
            libre_link_up_token_expires: None,
            libre_link_up_region: None,
            reading_interval_minutes: DEFAULT_READING_INTERVAL_MINUTES,
            fetch_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Overlay `CGMSYNC_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if let Some(site) = var(NIGHTSCOUT_SITE_ENV) {
            self.nightscout_site = Some(site);
        }
        if let Some(token) = var(NIGHTSCOUT_TOKEN_ENV) {
            self.nightscout_token = Some(token);
        }
        if let Some(email) = var(LIBRELINKUP_EMAIL_ENV) {
            self.libre_link_up_email = Some(email);
        }
        if let Some(password) = var(LIBRELINKUP_PASSWORD_ENV) {
            self.libre_link_up_password = Some(password);
        }
    }

    pub fn reading_interval(&self) -> Duration {
        Duration::from_secs(self.reading_interval_minutes.max(1) * 60)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Validated credentials for `backend`, or `None` if not set up.
    ///
    /// Secrets come from the config's in-memory fields (set from the
    /// environment) first, then the keychain. A Nightscout site without a
    /// token is treated as public.
    pub fn credentials_for(&self, backend: Backend) -> Result<Option<Credentials>> {
        match backend {
            Backend::Nightscout => {
                let Some(site) = self.nightscout_site.as_deref() else {
                    return Ok(None);
                };
                let token = match &self.nightscout_token {
                    Some(token) => token.clone(),
                    None => keychain_secret(backend, site).unwrap_or_default(),
                };
                Ok(Some(Credentials::nightscout(site, &token)?))
            }
            Backend::LibreLinkUp => {
                let Some(email) = self.libre_link_up_email.as_deref() else {
                    return Ok(None);
                };
                let password = match &self.libre_link_up_password {
                    Some(password) => Some(password.clone()),
                    None => keychain_secret(backend, email),
                };
                match password {
                    Some(password) => Ok(Some(Credentials::libre_link_up(email, &password)?)),
                    None => {
                        debug!("No LibreLinkUp password in environment or keychain");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Mirror a fresh LibreLinkUp session into the saved config.
    pub fn record_session(&mut self, session: &Session) {
        self.libre_link_up_token_expires = Some(session.expires_at.timestamp());
        if session.region.is_some() {
            self.libre_link_up_region = session.region.clone();
        }
    }
}

fn keychain_secret(backend: Backend, account: &str) -> Option<String> {
    match CredentialStore::get_secret(backend, account) {
        Ok(secret) => Some(secret),
        Err(e) => {
            debug!(backend = %backend, error = %e, "No secret in keychain");
            None
        }
    }
}
