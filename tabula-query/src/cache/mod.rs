//! Key-value cache used to memoize schema derivations.
//!
//! The registry only relies on the [`CacheBackend`] interface. Two backends
//! ship with the crate:
//!
//! - [`NullCache`]: every `get` misses and every write succeeds
//! - [`MemoryCache`]: an in-process map with per-entry TTL
//!
//! ```rust
//! use std::time::Duration;
//! use tabula_query::cache::{CacheBackend, CacheKey, MemoryCache};
//!
//! let cache = MemoryCache::builder().max_capacity(100).build();
//! let key = CacheKey::new("table_name", "app::Contact");
//! cache.set_as(&key, &"contact", Some(Duration::from_secs(60))).unwrap();
//! assert_eq!(cache.get_as::<String>(&key).unwrap(), Some("contact".to_string()));
//! ```

mod backend;
mod key;
mod memory;

pub use backend::{CacheBackend, CacheEntry, CacheError, CacheResult, NullCache};
pub use key::CacheKey;
pub use memory::{MemoryCache, MemoryCacheBuilder, MemoryCacheConfig};
