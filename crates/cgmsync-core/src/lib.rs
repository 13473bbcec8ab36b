//! cgmsync core: keeps a local history of glucose readings in sync with a
//! remote Nightscout server or the LibreLinkUp cloud.
//!
//! - `api`: HTTP clients for both backends and the `ReadingFetcher`
//! - `auth`: credentials, keychain secrets, LibreLinkUp sessions
//! - `cache`: in-memory `HistoryStore` and its on-disk copy
//! - `connection`/`countdown`: connection state and time to next reading
//! - `sync`: the `SyncOrchestrator` that runs fetch cycles
//! - `events`: broadcast stream of state changes for front ends

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connection;
pub mod countdown;
pub mod events;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, AuthError, FetchError, ReadingFetcher};
pub use auth::{Credentials, Session, SessionManager};
pub use cache::{CacheManager, HistoryStore};
pub use config::Config;
pub use connection::{ConnectionMonitor, ConnectionState, ConnectionStatus};
pub use countdown::{Countdown, CountdownScheduler};
pub use events::{EventDispatcher, SyncEvent};
pub use models::{Backend, GlucoseReading};
pub use sync::{CycleOutcome, SyncError, SyncHandle, SyncOrchestrator};
