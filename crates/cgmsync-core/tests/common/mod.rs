#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::MockServer;

use cgmsync_core::api::{ApiClient, LibreLinkUpClient, NightscoutClient};
use cgmsync_core::{
    ConnectionMonitor, Credentials, EventDispatcher, HistoryStore, ReadingFetcher, Session,
    SessionManager, SyncOrchestrator,
};

pub const EMAIL: &str = "follower@example.com";
pub const PASSWORD: &str = "correct horse";

pub fn api() -> ApiClient {
    ApiClient::with_timeout(Duration::from_secs(5)).expect("client")
}

pub fn libre_client(server: &MockServer) -> LibreLinkUpClient {
    LibreLinkUpClient::new(api())
        .with_base_url(server.uri())
        .with_graph(false)
}

pub fn fetcher(server: &MockServer) -> ReadingFetcher {
    ReadingFetcher::new(NightscoutClient::new(api()), libre_client(server))
}

pub fn libre_credentials() -> Credentials {
    Credentials::libre_link_up(EMAIL, PASSWORD).expect("valid credentials")
}

pub fn nightscout_credentials(server: &MockServer, token: &str) -> Credentials {
    Credentials::nightscout(&server.uri(), token).expect("valid credentials")
}

pub fn in_one_hour() -> DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(1)
}

pub fn valid_session(token: &str) -> Session {
    Session::new(token, in_one_hour(), EMAIL).with_account_id(Some("user-1".to_string()))
}

pub struct Harness {
    pub sync: Arc<SyncOrchestrator>,
    pub sessions: Arc<SessionManager>,
    pub events: EventDispatcher,
}

pub fn harness(server: &MockServer, credentials: Credentials, timeout: Duration) -> Harness {
    let events = EventDispatcher::default();
    let fetcher = fetcher(server);
    let sessions = Arc::new(
        SessionManager::new(fetcher.libre_link_up().clone()).with_events(events.clone()),
    );
    let monitor = Arc::new(ConnectionMonitor::default().with_events(events.clone()));
    let sync = SyncOrchestrator::new(
        fetcher,
        Arc::clone(&sessions),
        Arc::new(HistoryStore::new()),
        monitor,
    )
    .with_events(events.clone())
    .with_credentials(credentials)
    .with_timeout(timeout);

    Harness {
        sync: Arc::new(sync),
        sessions,
        events,
    }
}

pub fn login_body(token: &str) -> Value {
    json!({
        "status": 0,
        "data": {
            "user": { "id": "user-1", "firstName": "Sam" },
            "authTicket": {
                "token": token,
                "expires": in_one_hour().timestamp(),
                "duration": 3_600_000
            }
        }
    })
}

pub fn connections_body(value: i64) -> Value {
    json!({
        "status": 0,
        "data": [{
            "id": "c1",
            "patientId": "p-1",
            "firstName": "Jane",
            "lastName": "Doe",
            "sensor": { "deviceId": "", "sn": "3MH00ABC" },
            "glucoseMeasurement": {
                "FactoryTimestamp": "3/7/2024 9:05:00 AM",
                "Timestamp": "3/7/2024 10:05:00 AM",
                "ValueInMgPerDl": value,
                "TrendArrow": 3
            }
        }]
    })
}

pub fn entry(minutes: i64, sgv: i64) -> Value {
    let at = Utc
        .with_ymd_and_hms(2024, 3, 7, 9, 0, 0)
        .single()
        .expect("valid")
        + chrono::Duration::minutes(minutes);
    json!({
        "type": "sgv",
        "sgv": sgv,
        "date": at.timestamp_millis(),
        "dateString": at.to_rfc3339(),
        "device": "xDrip-DexcomG6 8G1234"
    })
}
