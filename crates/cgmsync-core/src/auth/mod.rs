//! Authentication module for backend credentials and LibreLinkUp sessions.
//!
//! This module provides:
//! - `Credentials`: validated Nightscout or LibreLinkUp credential pair
//! - `CredentialStore`: secret storage in the OS keychain via keyring
//! - `Session`/`SessionFile`: time-bounded LibreLinkUp token, persisted to disk
//! - `SessionManager`: cached, single-flight login

pub mod credentials;
pub mod manager;
pub mod session;

pub use credentials::{normalize_site, CredentialStore, Credentials, CredentialsError};
pub use manager::SessionManager;
pub use session::{Session, SessionFile};
