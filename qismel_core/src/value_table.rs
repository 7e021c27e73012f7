//! Fingerprint → value estimates.
//!
//! The value table is the only mutable state the engine owns. It runs in one
//! of two modes:
//!
//! - **Unbounded** (default): entries are created on first write and never
//!   removed, so memory grows with the number of distinct state-action
//!   pairs ever updated.
//! - **Bounded**: an LRU cache of fixed capacity. Writing a new key into a
//!   full table evicts the least recently used entry; evicted pairs fall
//!   back to the default value of `0.0`.
//!
//! Concurrent agents share one table through [`SharedValueTable`]; every
//! read-modify-write happens under a single exclusive lock.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointError, Checkpointable};
use crate::error::{CoreError, CoreResult};
use crate::fingerprint::Fingerprint;

/// Value returned for fingerprints that have never been written.
pub const DEFAULT_VALUE: f64 = 0.0;

/// A value table shared between agent loops.
pub type SharedValueTable = Arc<Mutex<ValueTable>>;

enum Storage {
    Unbounded(HashMap<Fingerprint, f64>),
    Bounded(LruCache<Fingerprint, f64>),
}

pub struct ValueTable {
    storage: Storage,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ValueTable {
    /// Creates an unbounded table.
    pub fn new() -> Self {
        Self::from_storage(Storage::Unbounded(HashMap::new()))
    }

    /// Creates an LRU-bounded table holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> CoreResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| CoreError::config("table_capacity", "must be at least 1"))?;
        Ok(Self::from_storage(Storage::Bounded(LruCache::new(capacity))))
    }

    fn from_storage(storage: Storage) -> Self {
        Self {
            storage,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Wraps the table for sharing across agent loops.
    pub fn shared(self) -> SharedValueTable {
        Arc::new(Mutex::new(self))
    }

    /// Looks up a value, returning [`DEFAULT_VALUE`] when absent.
    ///
    /// In bounded mode a hit marks the entry as most recently used.
    pub fn get(&mut self, key: &Fingerprint) -> f64 {
        let found = match &mut self.storage {
            Storage::Unbounded(map) => map.get(key).copied(),
            Storage::Bounded(cache) => cache.get(key).copied(),
        };
        match found {
            Some(value) => {
                self.hits += 1;
                value
            }
            None => {
                self.misses += 1;
                DEFAULT_VALUE
            }
        }
    }

    /// Looks up a value without touching recency or statistics.
    pub fn peek(&self, key: &Fingerprint) -> f64 {
        let found = match &self.storage {
            Storage::Unbounded(map) => map.get(key),
            Storage::Bounded(cache) => cache.peek(key),
        };
        found.copied().unwrap_or(DEFAULT_VALUE)
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        match &self.storage {
            Storage::Unbounded(map) => map.contains_key(key),
            Storage::Bounded(cache) => cache.contains(key),
        }
    }

    pub fn set(&mut self, key: Fingerprint, value: f64) {
        match &mut self.storage {
            Storage::Unbounded(map) => {
                map.insert(key, value);
            }
            Storage::Bounded(cache) => {
                if let Some((old_key, _)) = cache.push(key.clone(), value) {
                    if old_key != key {
                        self.evictions += 1;
                        tracing::debug!("evicted value table entry {}", old_key.preview());
                    }
                }
            }
        }
    }

    /// Single read-modify-write against one key.
    ///
    /// `f` receives the current value (default `0.0`). If it fails, the
    /// entry is left exactly as it was. Returns `(previous, new)`.
    pub fn update_with<F>(&mut self, key: Fingerprint, f: F) -> CoreResult<(f64, f64)>
    where
        F: FnOnce(f64) -> CoreResult<f64>,
    {
        let previous = self.get(&key);
        let next = f(previous)?;
        self.set(key, next);
        Ok((previous, next))
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Unbounded(map) => map.len(),
            Storage::Bounded(cache) => cache.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries, or `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match &self.storage {
            Storage::Unbounded(_) => None,
            Storage::Bounded(cache) => Some(cache.cap().get()),
        }
    }

    /// All entries ordered by fingerprint.
    pub fn entries(&self) -> Vec<(Fingerprint, f64)> {
        let mut entries: Vec<(Fingerprint, f64)> = match &self.storage {
            Storage::Unbounded(map) => map.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Storage::Bounded(cache) => cache.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Hit rate in `[0.0, 1.0]`; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Removes every entry and resets statistics.
    pub fn clear(&mut self) {
        match &mut self.storage {
            Storage::Unbounded(map) => map.clear(),
            Storage::Bounded(cache) => cache.clear(),
        }
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Loads a checkpoint into an LRU-bounded table.
    ///
    /// Entries are inserted in fingerprint order, so when the checkpoint
    /// holds more than `capacity` entries the lowest fingerprints are evicted.
    pub fn load_bounded<P: AsRef<Path>>(
        path: P,
        capacity: usize,
    ) -> Result<Self, CheckpointError> {
        let snapshot = Self::load_snapshot(path)?;
        snapshot.validate()?;
        let mut table = Self::with_capacity(capacity)
            .map_err(|err| CheckpointError::InvalidFormat(err.to_string()))?;
        for (key, value) in snapshot.entries {
            table.set(key, value);
        }
        Ok(table)
    }
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("evictions", &self.evictions)
            .finish()
    }
}

/// Persisted form of a [`ValueTable`]: every entry in fingerprint order.
///
/// Statistics and capacity are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTableSnapshot {
    pub entries: Vec<(Fingerprint, f64)>,
}

impl ValueTableSnapshot {
    fn validate(&self) -> Result<(), CheckpointError> {
        if self.entries.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
            return Err(CheckpointError::InvalidFormat(
                "entries must be strictly ordered by fingerprint".into(),
            ));
        }
        if let Some((_, value)) = self.entries.iter().find(|(_, value)| !value.is_finite()) {
            return Err(CheckpointError::InvalidFormat(format!(
                "entry value {value} is not finite"
            )));
        }
        Ok(())
    }
}

impl Checkpointable for ValueTable {
    const KIND: &'static str = "value_table";
    const VERSION: u32 = 1;

    type Snapshot = ValueTableSnapshot;

    fn snapshot(&self) -> ValueTableSnapshot {
        ValueTableSnapshot {
            entries: self.entries(),
        }
    }

    /// Restores an unbounded table. Use [`ValueTable::load_bounded`] for LRU mode.
    fn restore(snapshot: ValueTableSnapshot) -> Result<Self, CheckpointError> {
        snapshot.validate()?;
        let map: HashMap<Fingerprint, f64> = snapshot.entries.into_iter().collect();
        Ok(Self::from_storage(Storage::Unbounded(map)))
    }
}
