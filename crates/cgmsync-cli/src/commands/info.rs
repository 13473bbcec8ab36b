use anyhow::Result;
use chrono::Utc;

use cgmsync_core::auth::SessionFile;
use cgmsync_core::utils::format_age;
use cgmsync_core::{Backend, CacheManager, Config, HistoryStore};

use super::{newest_first, print_readings};

/// Print the on-disk history without contacting the server.
pub async fn history(config: &Config, backend: Backend, limit: usize, json: bool) -> Result<()> {
    let cache = CacheManager::new(config.cache_dir()?)?;
    let Some(cached) = cache.load_history(backend)? else {
        println!("No cached {} history", backend);
        return Ok(());
    };

    let age = cached.age_display();
    let store = HistoryStore::new();
    store.merge(backend, cached.data).await;
    let history = store.snapshot(backend).await;

    if !json {
        println!("{} history, {} readings, saved {}", backend, history.len(), age);
    }
    print_readings(&newest_first(&history, limit), json)
}

pub fn toggle(config: &mut Config) -> Result<()> {
    config.service = config.service.toggle();
    config.save()?;
    println!("Service: {}", config.service);
    Ok(())
}

pub fn status(config: &Config) -> Result<()> {
    let cache_dir = config.cache_dir()?;
    let cache = CacheManager::new(cache_dir.clone())?;
    let ages = cache.get_cache_ages();

    println!("Service:   {}", config.service);
    println!("Interval:  {} min", config.reading_interval_minutes);
    for backend in Backend::ALL {
        let account = match backend {
            Backend::Nightscout => config.nightscout_site.as_deref(),
            Backend::LibreLinkUp => config.libre_link_up_email.as_deref(),
        };
        println!(
            "{:<11}{} (history {})",
            format!("{}:", backend.display_name()),
            account.unwrap_or("not set up"),
            ages.for_backend(backend)
        );
    }

    match SessionFile::new(cache_dir).load()? {
        Some(session) => println!(
            "Session:   valid for {} min{}",
            session.minutes_until_expiry(),
            session
                .region
                .as_deref()
                .map(|r| format!(" (region {})", r))
                .unwrap_or_default()
        ),
        None => println!("Session:   none"),
    }

    if let Some(last) = cache
        .load_history(config.service)
        .ok()
        .flatten()
        .and_then(|cached| cached.data.last().map(|r| r.timestamp()))
    {
        println!("Latest:    {}", format_age(last, Utc::now()));
    }
    Ok(())
}
