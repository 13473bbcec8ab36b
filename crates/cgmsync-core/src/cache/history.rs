//! In-memory reading history per backend.
//!
//! Each backend's log is a `Vec` sorted ascending by timestamp and unique
//! on `(source, timestamp)`. Logs are published as `Arc<Vec<_>>`: readers
//! take a snapshot under a short read lock and keep it as long as they
//! like, while a merge holds the write lock and either mutates in place
//! (no outstanding snapshots) or works on a private copy. A reader never
//! observes a half-merged log.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Backend, GlucoseReading};

/// Outcome of a single merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    /// Readings that were not already present
    pub inserted: usize,
    /// Log length after the merge
    pub total: usize,
    /// Store generation after the merge
    pub generation: u64,
}

#[derive(Default)]
struct Logs {
    by_backend: HashMap<Backend, Arc<Vec<GlucoseReading>>>,
    generation: u64,
}

#[derive(Default)]
pub struct HistoryStore {
    logs: RwLock<Logs>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the readings of `batch` that are not yet in `backend`'s log.
    ///
    /// Only the part of the log at or after the batch's oldest reading is
    /// touched, so repeated overlapping fetches cost roughly the size of
    /// the batch rather than the size of the history.
    pub async fn merge(&self, backend: Backend, batch: Vec<GlucoseReading>) -> MergeResult {
        let batch = normalize_batch(batch);

        let mut logs = self.logs.write().await;
        let generation = logs.generation;
        let log = logs.by_backend.entry(backend).or_default();

        let Some(oldest) = batch.first() else {
            return MergeResult {
                inserted: 0,
                total: log.len(),
                generation,
            };
        };

        let start = log.partition_point(|r| r.cmp_key(oldest) == Ordering::Less);
        let fresh = missing_from(&log[start..], batch);
        if fresh.is_empty() {
            debug!(backend = %backend, "Merge found nothing new");
            return MergeResult {
                inserted: 0,
                total: log.len(),
                generation,
            };
        }

        let inserted = fresh.len();
        let entries = Arc::make_mut(log);
        let appends = entries
            .last()
            .map(|last| last.cmp_key(&fresh[0]) == Ordering::Less)
            .unwrap_or(true);

        if appends {
            entries.extend(fresh);
        } else {
            let tail = entries.split_off(start);
            entries.reserve(tail.len() + fresh.len());
            merge_into(entries, tail, fresh);
        }

        let total = entries.len();
        logs.generation += 1;
        let generation = logs.generation;
        debug!(backend = %backend, inserted, total, generation, "Merged readings");

        MergeResult {
            inserted,
            total,
            generation,
        }
    }

    /// Read-only view of `backend`'s log as of the last completed merge.
    pub async fn snapshot(&self, backend: Backend) -> Arc<Vec<GlucoseReading>> {
        self.logs
            .read()
            .await
            .by_backend
            .get(&backend)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recent reading of `backend`
    pub async fn latest(&self, backend: Backend) -> Option<GlucoseReading> {
        self.logs
            .read()
            .await
            .by_backend
            .get(&backend)
            .and_then(|log| log.last().cloned())
    }

    pub async fn len(&self, backend: Backend) -> usize {
        self.logs
            .read()
            .await
            .by_backend
            .get(&backend)
            .map(|log| log.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, backend: Backend) -> bool {
        self.len(backend).await == 0
    }

    /// Number of merges that changed any log
    pub async fn generation(&self) -> u64 {
        self.logs.read().await.generation
    }
}

/// Sort by identity and drop in-batch duplicates (first one wins).
fn normalize_batch(mut batch: Vec<GlucoseReading>) -> Vec<GlucoseReading> {
    batch.sort_by(|a, b| a.cmp_key(b));
    batch.dedup_by(|later, earlier| later.same_entry(earlier));
    batch
}

/// Readings of the sorted `batch` that have no identity match in the sorted `existing` slice.
fn missing_from(existing: &[GlucoseReading], batch: Vec<GlucoseReading>) -> Vec<GlucoseReading> {
    let mut fresh = Vec::new();
    let mut i = 0;
    for reading in batch {
        while i < existing.len() && existing[i].cmp_key(&reading) == Ordering::Less {
            i += 1;
        }
        if i < existing.len() && existing[i].same_entry(&reading) {
            continue;
        }
        fresh.push(reading);
    }
    fresh
}

/// Two-way merge of sorted, disjoint runs onto the end of `out`.
fn merge_into(out: &mut Vec<GlucoseReading>, left: Vec<GlucoseReading>, right: Vec<GlucoseReading>) {
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.cmp_key(r) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        out.extend(next);
    }
}
