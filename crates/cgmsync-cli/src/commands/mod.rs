//! Command implementations and the shared sync runtime.

pub mod info;
pub mod login;
pub mod sync;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use cgmsync_core::api::{LibreLinkUpClient, NightscoutClient};
use cgmsync_core::auth::SessionFile;
use cgmsync_core::utils::format_reading_row;
use cgmsync_core::{
    ApiClient, Backend, CacheManager, Config, ConnectionMonitor, EventDispatcher, GlucoseReading,
    HistoryStore, ReadingFetcher, SessionManager, SyncOrchestrator,
};

/// Everything a sync command needs, wired from the config.
pub struct Runtime {
    pub sync: Arc<SyncOrchestrator>,
    pub events: EventDispatcher,
}

impl Runtime {
    pub fn build(config: &Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let api = ApiClient::new()?;
        let events = EventDispatcher::default();

        let nightscout = NightscoutClient::new(api.clone()).with_count(config.nightscout_count);
        let libre_link_up = LibreLinkUpClient::new(api);
        let fetcher = ReadingFetcher::new(nightscout, libre_link_up.clone());

        let sessions = SessionManager::new(libre_link_up)
            .with_session_file(SessionFile::new(cache_dir.clone()))
            .with_region(config.libre_link_up_region.clone())
            .with_events(events.clone());
        let monitor =
            ConnectionMonitor::new(config.max_consecutive_failures).with_events(events.clone());

        let mut sync = SyncOrchestrator::new(
            fetcher,
            Arc::new(sessions),
            Arc::new(HistoryStore::new()),
            Arc::new(monitor),
        )
        .with_events(events.clone())
        .with_timeout(config.fetch_timeout())
        .with_cache(CacheManager::new(cache_dir)?);

        for backend in Backend::ALL {
            let credentials = config
                .credentials_for(backend)
                .with_context(|| format!("Invalid {} settings", backend))?;
            if let Some(credentials) = credentials {
                sync = sync.with_credentials(credentials);
            }
        }

        Ok(Self {
            sync: Arc::new(sync),
            events,
        })
    }

    /// Copy the current LibreLinkUp session expiry into the config and save it.
    pub async fn save_session_state(&self, config: &mut Config) -> Result<()> {
        if let Some(session) = self.sync.sessions().current().await {
            config.record_session(&session);
            config.save()?;
        }
        Ok(())
    }
}

/// Read one line from stdin after printing `label`.
pub fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(line.to_string())
    }
}

/// Newest first, at most `limit` rows (0 for all).
pub fn newest_first(history: &[GlucoseReading], limit: usize) -> Vec<&GlucoseReading> {
    let take = if limit == 0 { history.len() } else { limit };
    history.iter().rev().take(take).collect()
}

pub fn print_readings(readings: &[&GlucoseReading], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(readings)?);
        return Ok(());
    }
    if readings.is_empty() {
        println!("No readings yet");
    }
    for reading in readings {
        println!("{}", format_reading_row(reading));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_newest_first() {
        let history: Vec<_> = (0..5)
            .map(|i| {
                GlucoseReading::new(
                    "ns",
                    100 + i,
                    Utc.timestamp_opt(1_700_000_000 + i as i64 * 300, 0)
                        .single()
                        .expect("valid"),
                )
            })
            .collect();

        let rows = newest_first(&history, 2);
        assert_eq!(rows.iter().map(|r| r.value()).collect::<Vec<_>>(), vec![104, 103]);
        assert_eq!(newest_first(&history, 0).len(), 5);
        assert_eq!(newest_first(&history, 50).len(), 5);
    }
}
