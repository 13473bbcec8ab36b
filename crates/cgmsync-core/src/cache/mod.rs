//! Reading history, in memory and on disk.
//!
//! - `HistoryStore`: per-backend ordered, deduplicated reading log
//! - `CacheManager`: JSON copies of each log so the list survives restarts.
//!   Cached history is considered stale after 15 minutes.

pub mod history;
pub mod manager;

pub use history::{HistoryStore, MergeResult};
pub use manager::{CacheAges, CacheManager, CachedData};
