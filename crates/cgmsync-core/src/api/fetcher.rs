use crate::auth::{Credentials, Session};
use crate::models::{Backend, GlucoseReading};

use super::{ApiClient, FetchError, LibreLinkUpClient, NightscoutClient};

/// What a fetch authenticates with.
#[derive(Debug, Clone, Copy)]
pub enum FetchAuth<'a> {
    /// Static credentials (Nightscout site + token)
    Credentials(&'a Credentials),
    /// Bearer session (LibreLinkUp)
    Session(&'a Session),
}

/// Dispatches `fetch_latest` to the right backend client.
#[derive(Clone, Debug)]
pub struct ReadingFetcher {
    nightscout: NightscoutClient,
    libre_link_up: LibreLinkUpClient,
}

impl ReadingFetcher {
    pub fn new(nightscout: NightscoutClient, libre_link_up: LibreLinkUpClient) -> Self {
        Self {
            nightscout,
            libre_link_up,
        }
    }

    /// Both clients with default settings on a shared connection pool
    pub fn from_api(api: ApiClient) -> Self {
        Self::new(NightscoutClient::new(api.clone()), LibreLinkUpClient::new(api))
    }

    pub fn libre_link_up(&self) -> &LibreLinkUpClient {
        &self.libre_link_up
    }

    /// Fetch the latest readings from `backend`.
    ///
    /// An auth value that does not fit the backend (e.g. LibreLinkUp without
    /// a session) is reported as `Unauthorized`.
    pub async fn fetch_latest(
        &self,
        backend: Backend,
        auth: FetchAuth<'_>,
    ) -> Result<Vec<GlucoseReading>, FetchError> {
        match (backend, auth) {
            (Backend::Nightscout, FetchAuth::Credentials(Credentials::Nightscout { site, token })) => {
                self.nightscout.fetch_entries(site, token).await
            }
            (Backend::LibreLinkUp, FetchAuth::Session(session)) => {
                self.libre_link_up.fetch_readings(session).await
            }
            _ => Err(FetchError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mismatched_auth_is_unauthorized() {
        let fetcher = ReadingFetcher::from_api(ApiClient::new().expect("client"));
        let creds = Credentials::libre_link_up("a@b.c", "pw").expect("valid");
        let result = fetcher
            .fetch_latest(Backend::LibreLinkUp, FetchAuth::Credentials(&creds))
            .await;
        assert_eq!(result, Err(FetchError::Unauthorized));
    }
}
