//! Time-windowed index of recently emitted articles.
//!
//! Keys are exact `(source_name, canonical url)` pairs, so membership can only
//! ever match an article that was already emitted under the same source: a
//! genuinely new article is never suppressed. Entries older than the retention
//! window are ignored by lookups and dropped by [`DedupIndex::prune`].

use crate::utils::write_atomic;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub source_name: String,
    pub url: String,
}

impl DedupKey {
    pub fn new(source_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    #[serde(flatten)]
    key: DedupKey,
    seen_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredIndex {
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Clone)]
pub struct DedupIndex {
    retention: Duration,
    seen: HashMap<DedupKey, DateTime<Utc>>,
}

impl DedupIndex {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: HashMap::new(),
        }
    }

    fn is_live(&self, seen_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - seen_at < self.retention
    }

    pub fn contains(&self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        self.seen
            .get(key)
            .is_some_and(|seen_at| self.is_live(*seen_at, now))
    }

    /// Record `key` as seen. Returns `false` if it was already live.
    pub fn insert(&mut self, key: DedupKey, now: DateTime<Utc>) -> bool {
        if self.contains(&key, now) {
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    pub fn forget<'a>(&mut self, keys: impl IntoIterator<Item = &'a DedupKey>) {
        for key in keys {
            self.seen.remove(key);
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        let retention = self.retention;
        self.seen.retain(|_, seen_at| now - *seen_at < retention);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Load a persisted index, skipping entries already outside the window.
    ///
    /// A missing file yields an empty index.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path, retention: Duration, now: DateTime<Utc>) -> io::Result<Self> {
        let mut index = Self::new(retention);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No dedup state yet; starting empty");
                return Ok(index);
            }
            Err(e) => return Err(e),
        };
        let stored: StoredIndex = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        for entry in stored.entries {
            if index.is_live(entry.seen_at, now) {
                index.seen.insert(entry.key, entry.seen_at);
            }
        }
        info!(entries = index.len(), "Loaded dedup state");
        Ok(index)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display(), entries = self.len()))]
    pub async fn save(&self, path: &Path) -> io::Result<()> {
        let mut entries: Vec<StoredEntry> = self
            .seen
            .iter()
            .map(|(key, seen_at)| StoredEntry {
                key: key.clone(),
                seen_at: *seen_at,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_vec(&StoredIndex { entries })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(path, &json).await
    }
}

/// Handle shared by every adapter task of a run.
#[derive(Debug, Clone)]
pub struct SharedDedupIndex(Arc<Mutex<DedupIndex>>);

impl SharedDedupIndex {
    pub fn new(index: DedupIndex) -> Self {
        Self(Arc::new(Mutex::new(index)))
    }

    fn lock(&self) -> MutexGuard<'_, DedupIndex> {
        self.0.lock().unwrap_or_else(|poisoned| {
            warn!("Dedup index mutex was poisoned; continuing with inner value");
            poisoned.into_inner()
        })
    }

    pub fn contains(&self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        self.lock().contains(key, now)
    }

    pub fn insert(&self, key: DedupKey, now: DateTime<Utc>) -> bool {
        self.lock().insert(key, now)
    }

    pub fn forget<'a>(&self, keys: impl IntoIterator<Item = &'a DedupKey>) {
        self.lock().forget(keys)
    }

    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        self.lock().prune(now)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Copy of the current index, for persisting without holding the lock.
    pub fn snapshot(&self) -> DedupIndex {
        self.lock().clone()
    }
}
