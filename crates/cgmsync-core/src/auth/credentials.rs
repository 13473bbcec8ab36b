use std::fmt;

use anyhow::{Context, Result};
use keyring::Entry;
use reqwest::Url;
use thiserror::Error;

use crate::models::Backend;

const SERVICE_NAME: &str = "cgmsync";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Nightscout URL is required")]
    EmptySite,

    #[error("Invalid Nightscout URL: {0}")]
    InvalidSite(String),

    #[error("A valid email address is required")]
    InvalidEmail,

    #[error("Password is required")]
    EmptyPassword,
}

/// Credentials for one backend.
///
/// Construct through [`Credentials::nightscout`] or
/// [`Credentials::libre_link_up`], which validate and normalize the input.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Site URL plus a static access token (may be empty for public sites)
    Nightscout { site: String, token: String },
    /// Account used for the LibreLinkUp login exchange
    LibreLinkUp { email: String, password: String },
}

impl Credentials {
    pub fn nightscout(site: &str, token: &str) -> Result<Self, CredentialsError> {
        Ok(Credentials::Nightscout {
            site: normalize_site(site)?,
            token: token.trim().to_string(),
        })
    }

    pub fn libre_link_up(email: &str, password: &str) -> Result<Self, CredentialsError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CredentialsError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(CredentialsError::EmptyPassword);
        }
        Ok(Credentials::LibreLinkUp {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    pub fn backend(&self) -> Backend {
        match self {
            Credentials::Nightscout { .. } => Backend::Nightscout,
            Credentials::LibreLinkUp { .. } => Backend::LibreLinkUp,
        }
    }

    /// Non-secret half of the pair: the site or the email.
    pub fn account(&self) -> &str {
        match self {
            Credentials::Nightscout { site, .. } => site,
            Credentials::LibreLinkUp { email, .. } => email,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Nightscout { site, .. } => f
                .debug_struct("Nightscout")
                .field("site", site)
                .field("token", &"<redacted>")
                .finish(),
            Credentials::LibreLinkUp { email, .. } => f
                .debug_struct("LibreLinkUp")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Prepend `https://` when no scheme was typed and drop trailing slashes.
pub fn normalize_site(site: &str) -> Result<String, CredentialsError> {
    let site = site.trim();
    if site.is_empty() {
        return Err(CredentialsError::EmptySite);
    }
    let with_scheme = if site.starts_with("http://") || site.starts_with("https://") {
        site.to_string()
    } else {
        format!("https://{}", site)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| CredentialsError::InvalidSite(format!("{}: {}", site, e)))?;
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(CredentialsError::InvalidSite(site.to_string()));
    }
    Ok(with_scheme.trim_end_matches('/').to_string())
}

/// Secrets (Nightscout token, LibreLinkUp password) kept in the OS keychain.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(backend: Backend, account: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &format!("{}:{}", backend.key(), account))
            .context("Failed to create keyring entry")
    }

    /// Store the secret for an account in the OS keychain
    pub fn store(backend: Backend, account: &str, secret: &str) -> Result<()> {
        Self::entry(backend, account)?
            .set_password(secret)
            .context("Failed to store secret in keychain")?;
        Ok(())
    }

    /// Retrieve the secret for an account from the OS keychain
    pub fn get_secret(backend: Backend, account: &str) -> Result<String> {
        Self::entry(backend, account)?
            .get_password()
            .context("Failed to retrieve secret from keychain")
    }

    /// Delete the stored secret for an account
    pub fn delete(backend: Backend, account: &str) -> Result<()> {
        Self::entry(backend, account)?
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Check if a secret exists for an account
    pub fn has_secret(backend: Backend, account: &str) -> bool {
        Self::entry(backend, account)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}
