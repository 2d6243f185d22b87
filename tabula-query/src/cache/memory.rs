//! In-process cache backend.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::backend::{CacheBackend, CacheEntry, CacheResult};
use super::key::CacheKey;

/// Configuration for the in-memory cache.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries.
    pub max_capacity: usize,
    /// Default time-to-live for entries set without one.
    pub time_to_live: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Some(Duration::from_secs(300)),
        }
    }
}

impl MemoryCacheConfig {
    /// Create a new config with the given capacity.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

/// Builder for [`MemoryCache`].
#[derive(Debug, Default)]
pub struct MemoryCacheBuilder {
    config: MemoryCacheConfig,
}

impl MemoryCacheBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max capacity.
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.config.max_capacity = capacity;
        self
    }

    /// Set the default TTL.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.config.time_to_live = Some(ttl);
        self
    }

    /// Keep entries until deleted.
    pub fn no_ttl(mut self) -> Self {
        self.config.time_to_live = None;
        self
    }

    /// Build the cache.
    pub fn build(self) -> MemoryCache {
        MemoryCache::new(self.config)
    }
}

/// A map guarded by a `parking_lot` lock, with TTL and capacity eviction.
#[derive(Debug)]
pub struct MemoryCache {
    config: MemoryCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Create a new memory cache with the given config.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a builder.
    pub fn builder() -> MemoryCacheBuilder {
        MemoryCacheBuilder::new()
    }

    /// Get the config.
    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Evict expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }

    /// Drop the oldest entries until there is room for one more.
    fn make_room(&self, entries: &mut HashMap<String, CacheEntry>) {
        entries.retain(|_, e| !e.is_expired());
        if entries.len() < self.config.max_capacity {
            return;
        }
        let mut by_age: Vec<(String, Instant)> =
            entries.iter().map(|(k, e)| (k.clone(), e.created_at)).collect();
        by_age.sort_by_key(|(_, t)| *t);
        let excess = entries.len() + 1 - self.config.max_capacity;
        for (key, _) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<serde_json::Value>> {
        let key = key.as_str();
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().remove(&key);
        Ok(None)
    }

    fn set(&self, key: &CacheKey, value: serde_json::Value, ttl: Option<Duration>) -> CacheResult<()> {
        if self.config.max_capacity == 0 {
            return Ok(());
        }
        let key = key.as_str();
        let entry = CacheEntry::new(value).with_ttl(ttl.or(self.config.time_to_live));
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) {
            self.make_room(&mut entries);
        }
        entries.insert(key, entry);
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        Ok(self.entries.write().remove(&key.as_str()).is_some())
    }

    fn clear(&self) -> CacheResult<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
