//! REST API clients for the two remote reading services.
//!
//! - `NightscoutClient`: self-hosted server, static access token
//! - `LibreLinkUpClient`: vendor cloud, email/password login and bearer token
//! - `ReadingFetcher`: one entry point that dispatches on the backend
//!
//! Both clients share one pooled `ApiClient`.

pub mod client;
pub mod error;
pub mod fetcher;
pub mod libre_link_up;
pub mod nightscout;

pub use client::ApiClient;
pub use error::{AuthError, FetchError};
pub use fetcher::{FetchAuth, ReadingFetcher};
pub use libre_link_up::LibreLinkUpClient;
pub use nightscout::NightscoutClient;
