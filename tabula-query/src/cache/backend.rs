//! Cache backend trait and core types.

use std::time::{Duration, Instant};
use thiserror::Error;

use super::key::CacheKey;
use crate::error::QueryError;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Backend-specific error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for QueryError {
    fn from(err: CacheError) -> Self {
        QueryError::internal(err.to_string()).with_source(err)
    }
}

/// A cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached JSON payload.
    pub value: serde_json::Value,
    /// When the entry was created.
    pub created_at: Instant,
    /// Time-to-live for this entry.
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create a new cache entry.
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl: None,
        }
    }

    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check if the entry is expired.
    pub fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created_at.elapsed() >= ttl)
    }

    /// Get remaining TTL.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.ttl.map(|ttl| ttl.saturating_sub(self.created_at.elapsed()))
    }
}

/// The interface every cache backend implements.
///
/// Payloads are JSON so the trait stays object safe; use
/// [`get_as`](CacheBackend::get_as) and [`set_as`](CacheBackend::set_as) for
/// typed access.
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache.
    fn get(&self, key: &CacheKey) -> CacheResult<Option<serde_json::Value>>;

    /// Set a value in the cache.
    fn set(&self, key: &CacheKey, value: serde_json::Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a value. Returns whether something was removed.
    fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Remove every entry.
    fn clear(&self) -> CacheResult<()>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Get and deserialize a value.
    fn get_as<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize and set a value.
    fn set_as<T: serde::Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set(key, value, ttl)
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CacheBackend for NullCache {
    fn get(&self, _key: &CacheKey) -> CacheResult<Option<serde_json::Value>> {
        Ok(None)
    }

    fn set(&self, _key: &CacheKey, _value: serde_json::Value, _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    fn delete(&self, _key: &CacheKey) -> CacheResult<bool> {
        Ok(true)
    }

    fn clear(&self) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
