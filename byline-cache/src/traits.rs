//! Marker trait for cacheable payloads and cache usage counters.

use serde::{de::DeserializeOwned, Serialize};

/// Marker for values the request cache can hold.
///
/// Entries are stored as their JSON representation, so a payload must
/// round-trip through serde. The blanket implementation covers every wire
/// type; the bound exists to name the requirement at the API surface.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Counters describing cache behavior since construction (or the last
/// reset). Useful in tests and diagnostics overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a stored entry, fresh or stale.
    pub hits: u64,
    /// Reads that had to start a loader.
    pub misses: u64,
    /// Reads that joined an already in-flight loader.
    pub joins: u64,
    /// Background refreshes started for stale entries.
    pub revalidations: u64,
    /// Loader results dropped because their key was invalidated or
    /// superseded while they were in flight.
    pub discarded: u64,
    /// Entries dropped by age-based eviction.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; joins count toward hits since no new
    /// request was issued for them.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.joins;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}
