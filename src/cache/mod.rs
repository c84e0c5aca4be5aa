//! Cache layer
//!
//! An in-process moka cache shared through `AppState`. Map searches are
//! cached here so repeated POI queries for the same region do not hit the
//! provider APIs.
//!
//! ```rust,ignore
//! let cache = create_cache(&config.cache);
//! cache.set("poi:baidu:上海:咖啡:100", &results, Duration::from_secs(600)).await?;
//! ```

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// `cache.ttl_seconds` caps every entry's TTL
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl))
}
