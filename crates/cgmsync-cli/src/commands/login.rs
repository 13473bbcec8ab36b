use anyhow::{bail, Result};
use tracing::warn;

use cgmsync_core::auth::{CredentialStore, SessionFile};
use cgmsync_core::{Backend, Config, Credentials, CycleOutcome};

use super::{prompt, Runtime};

pub async fn login(config: &mut Config, backend: Backend) -> Result<()> {
    match backend {
        Backend::Nightscout => login_nightscout(config).await,
        Backend::LibreLinkUp => login_libre_link_up(config).await,
    }
}

async fn login_nightscout(config: &mut Config) -> Result<()> {
    let site = prompt("Nightscout URL", config.nightscout_site.as_deref())?;
    let token = rpassword::prompt_password("Access token (empty for a public site): ")?;
    let credentials = Credentials::nightscout(&site, &token)?;

    config.nightscout_site = Some(credentials.account().to_string());
    config.nightscout_token = Some(token.trim().to_string());

    let runtime = Runtime::build(config)?;
    match runtime.sync.run_cycle(Backend::Nightscout).await {
        Ok(CycleOutcome::Merged { fetched, .. }) => {
            println!("Connected to {} ({} readings)", credentials.account(), fetched)
        }
        Ok(CycleOutcome::Skipped) => {}
        Err(e) => bail!("{}", e.user_message()),
    }

    if !token.trim().is_empty() {
        CredentialStore::store(Backend::Nightscout, credentials.account(), token.trim())?;
    }
    config.service = Backend::Nightscout;
    config.save()?;
    Ok(())
}

async fn login_libre_link_up(config: &mut Config) -> Result<()> {
    let email = prompt("LibreLinkUp email", config.libre_link_up_email.as_deref())?;
    let password = rpassword::prompt_password("Password: ")?;
    let credentials = Credentials::libre_link_up(&email, &password)?;

    config.libre_link_up_email = Some(credentials.account().to_string());
    config.libre_link_up_password = Some(password.clone());

    let runtime = Runtime::build(config)?;
    // Drop any session issued for the previous account or password
    runtime.sync.sessions().logout().await?;
    let session = match runtime.sync.sessions().ensure_valid_session(&credentials).await {
        Ok(Some(session)) => session,
        Ok(None) => bail!("LibreLinkUp returned no session"),
        Err(e) => bail!("{}", e.user_message()),
    };

    CredentialStore::store(Backend::LibreLinkUp, credentials.account(), &password)?;
    config.record_session(&session);
    config.service = Backend::LibreLinkUp;
    config.save()?;

    println!(
        "Logged in as {} (session valid for {} min)",
        session.email,
        session.minutes_until_expiry()
    );
    Ok(())
}

pub async fn logout(config: &mut Config, only: Option<Backend>) -> Result<()> {
    let backends = match only {
        Some(backend) => vec![backend],
        None => Backend::ALL.to_vec(),
    };

    for backend in backends {
        match backend {
            Backend::Nightscout => {
                if let Some(site) = &config.nightscout_site {
                    forget_secret(backend, site);
                }
            }
            Backend::LibreLinkUp => {
                SessionFile::new(config.cache_dir()?).clear()?;
                if let Some(email) = &config.libre_link_up_email {
                    forget_secret(backend, email);
                }
                config.libre_link_up_token_expires = None;
            }
        }
        println!("Logged out of {}", backend);
    }

    config.save()?;
    Ok(())
}

fn forget_secret(backend: Backend, account: &str) {
    if !CredentialStore::has_secret(backend, account) {
        return;
    }
    if let Err(e) = CredentialStore::delete(backend, account) {
        warn!(backend = %backend, error = %e, "Failed to delete stored secret");
    }
}
