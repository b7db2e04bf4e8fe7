//! Response cache with TTL, stale-while-revalidate and bounded size.
//!
//! This module provides a caching layer that:
//! - Stores JSON-serializable responses under a caller-chosen key
//! - Serves stale entries while refreshing them in the background
//! - Falls back to expired entries when the network is unavailable
//! - Trims the oldest entries once the store reaches its size limit

mod entry;
mod layer;
mod pattern;

pub use entry::{CacheEntry, CacheOptions, CacheResult, CacheSource};
pub use layer::ResponseCache;
pub use pattern::KeyPattern;
