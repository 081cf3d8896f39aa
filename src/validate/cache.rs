//! Concurrent TTL cache for URL verdicts.
//!
//! Expiry is driven by an injected [`Clock`] so that logical time, not wall
//! time, decides when an entry goes stale.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::model::ValidationResult;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ValidationResult,
    pub stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ValidationCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ValidationCache {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            clock,
        }
    }

    /// Returns the cached verdict for `key` unless it has expired.
    ///
    /// Expired entries are evicted on read.
    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if now.signed_duration_since(entry.stored_at) < self.ttl {
                return Some(entry.result.clone());
            }
        }
        self.entries
            .remove_if(key, |_, entry| now.signed_duration_since(entry.stored_at) >= self.ttl);
        None
    }

    pub fn insert(&self, key: impl Into<String>, result: ValidationResult) {
        let entry = CacheEntry {
            result,
            stored_at: self.clock.now(),
        };
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
