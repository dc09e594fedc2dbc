//! Normalized-side cache
//!
//! Callers that compare the same extract against several candidates can hand
//! the engine a [`DatasetCache`]; a hit skips the read and normalize stages
//! for that side. Entries are keyed by a content fingerprint, so a changed
//! file never serves stale records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::DatasetDescriptor;
use crate::normalize::NormalizedSide;
use crate::normalize::reader::{ReadError, ReadResult, resolve_files};

/// Default number of normalized sides held in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// Fingerprint a dataset: the descriptor's normalization settings plus the
/// bytes of every file its location resolves to. Two descriptors reading the
/// same files with different column maps fingerprint differently.
pub fn dataset_fingerprint(descriptor: &DatasetDescriptor) -> ReadResult<String> {
    let mut hasher = Sha256::new();

    let descriptor_json =
        serde_json::to_vec(descriptor).map_err(|e| ReadError::Io {
            path: descriptor.location.clone(),
            message: e.to_string(),
        })?;
    hasher.update(&descriptor_json);

    for path in resolve_files(&descriptor.location)? {
        let content = std::fs::read(&path).map_err(|e| ReadError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        hasher.update(path.display().to_string().as_bytes());
        hasher.update(&content);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

struct CacheEntry {
    side: Arc<NormalizedSide>,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Capacity-bounded cache of normalized sides with least-recently-used
/// eviction. Safe to share across jobs.
pub struct DatasetCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl DatasetCache {
    /// A cache holding at most `capacity` sides. Zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        DatasetCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up a fingerprint, refreshing its recency on a hit.
    pub fn get(&self, fingerprint: &str) -> Option<Arc<NormalizedSide>> {
        let mut inner = self.inner.lock().ok()?;
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(fingerprint)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.side))
    }

    /// Insert a normalized side, evicting the least recently used entry when
    /// full. Returns the shared handle.
    pub fn insert(&self, fingerprint: String, side: NormalizedSide) -> Arc<NormalizedSide> {
        let side = Arc::new(side);
        let Ok(mut inner) = self.inner.lock() else {
            return side;
        };

        if !inner.entries.contains_key(&fingerprint) && inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&evicted);
                debug!(fingerprint = %evicted, "Evicted cached dataset");
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(fingerprint, CacheEntry {
            side: Arc::clone(&side),
            last_used: tick,
        });
        side
    }

    /// Drop every cached side.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
