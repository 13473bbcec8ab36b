//! Client for self-hosted Nightscout servers.
//!
//! Nightscout authenticates reads with a long-lived access token passed as a
//! query parameter, so no login exchange is needed.

use tracing::{debug, info};

use crate::models::nightscout::parse_entries;
use crate::models::{GlucoseReading, NightscoutEntry};

use super::{ApiClient, FetchError};

/// Number of entries requested per fetch.
/// 24 entries cover two hours of 5-minute readings.
pub const DEFAULT_ENTRY_COUNT: usize = 24;

#[derive(Clone, Debug)]
pub struct NightscoutClient {
    api: ApiClient,
    count: usize,
}

impl NightscoutClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            count: DEFAULT_ENTRY_COUNT,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    fn entries_url(site: &str) -> String {
        format!("{}/api/v1/entries.json", site.trim_end_matches('/'))
    }

    /// Fetch the latest sgv entries from `site`.
    pub async fn fetch_entries(
        &self,
        site: &str,
        token: &str,
    ) -> Result<Vec<GlucoseReading>, FetchError> {
        let url = Self::entries_url(site);
        debug!(url = %url, count = self.count, "Fetching Nightscout entries");

        let mut query: Vec<(&str, String)> = vec![("count", self.count.to_string())];
        if !token.is_empty() {
            query.push(("token", token.to_string()));
        }

        let request = self.api.http().get(&url).query(&query);
        let entries: Vec<NightscoutEntry> = ApiClient::send_json(request).await?;
        let readings = parse_entries(entries).map_err(FetchError::Decode)?;

        info!(count = readings.len(), "Fetched Nightscout readings");
        Ok(readings)
    }
}
