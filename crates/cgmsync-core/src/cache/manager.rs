use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{Backend, GlucoseReading};

/// Consider cached history stale after 15 minutes.
/// Three missed 5-minute readings means the list no longer reflects the sensor.
const CACHE_STALE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// JSON files holding each backend's reading history between runs.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn history_name(backend: Backend) -> String {
        format!("history_{}", backend.key())
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.cache_path(name);
        let contents = serde_json::to_string_pretty(&cached)?;
        // Write then rename so a crash never leaves a truncated file behind
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache file: {}", name))?;
        Ok(())
    }

    // ===== History =====

    pub fn load_history(&self, backend: Backend) -> Result<Option<CachedData<Vec<GlucoseReading>>>> {
        self.load(&Self::history_name(backend))
    }

    pub fn save_history(&self, backend: Backend, readings: &[GlucoseReading]) -> Result<()> {
        self.save(&Self::history_name(backend), &readings)
    }

    pub fn clear_history(&self, backend: Backend) -> Result<()> {
        let path = self.cache_path(&Self::history_name(backend));
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    // ===== Cache Age Information =====

    fn history_age(&self, backend: Backend) -> Option<String> {
        match self.load_history(backend) {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(backend = %backend, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    pub fn get_cache_ages(&self) -> CacheAges {
        CacheAges {
            nightscout: self.history_age(Backend::Nightscout),
            libre_link_up: self.history_age(Backend::LibreLinkUp),
        }
    }

    /// Whether `backend`'s cached history is missing, unreadable or stale
    pub fn is_stale(&self, backend: Backend) -> bool {
        match self.load_history(backend) {
            Ok(Some(cached)) => cached.is_stale(),
            Ok(None) => true,
            Err(e) => {
                debug!(backend = %backend, error = %e, "Failed to load cache for staleness check");
                true
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheAges {
    pub nightscout: Option<String>,
    pub libre_link_up: Option<String>,
}

impl CacheAges {
    pub fn for_backend(&self, backend: Backend) -> String {
        let age = match backend {
            Backend::Nightscout => &self.nightscout,
            Backend::LibreLinkUp => &self.libre_link_up,
        };
        age.clone().unwrap_or_else(|| "never".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_rounding() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");
        cached.cached_at = Utc::now() - Duration::hours(25);
        assert_eq!(cached.age_display(), "1d ago");
        cached.cached_at = Utc::now() + Duration::minutes(3);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(16);
        assert!(old.is_stale());
    }

    #[test]
    fn test_history_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CacheManager::new(dir.path().join("cache")).expect("cache");
        assert!(cache.load_history(Backend::Nightscout).expect("load").is_none());
        assert!(cache.is_stale(Backend::Nightscout));

        let readings = vec![GlucoseReading::new("ns", 120, Utc::now())];
        cache.save_history(Backend::Nightscout, &readings).expect("save");

        let loaded = cache
            .load_history(Backend::Nightscout)
            .expect("load")
            .expect("present");
        assert_eq!(loaded.data, readings);
        assert!(!cache.is_stale(Backend::Nightscout));
        assert!(cache.load_history(Backend::LibreLinkUp).expect("load").is_none());

        let ages = cache.get_cache_ages();
        assert_eq!(ages.for_backend(Backend::Nightscout), "just now");
        assert_eq!(ages.for_backend(Backend::LibreLinkUp), "never");

        cache.clear_history(Backend::Nightscout).expect("clear");
        assert!(cache.load_history(Backend::Nightscout).expect("load").is_none());
    }

    #[test]
    fn test_corrupt_cache_is_error_and_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache");
        std::fs::write(dir.path().join("history_librelinkup.json"), "{not json").expect("write");
        assert!(cache.load_history(Backend::LibreLinkUp).is_err());
        assert!(cache.is_stale(Backend::LibreLinkUp));
    }
}
