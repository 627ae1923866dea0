//! Cache tuning knobs.

use std::time::Duration;

/// Configuration for [`RequestCache`](crate::RequestCache).
///
/// The defaults match the client's interaction tempo: five minutes of
/// freshness before a background refresh is considered, ten minutes of
/// idleness before an entry is eligible for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a fulfilled entry is served without triggering a
    /// background refresh.
    pub freshness_window: Duration,
    /// How long an entry may go unread before `evict` may drop it.
    /// Entries with an in-flight load are never dropped.
    pub evict_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(300),
            evict_age: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_evict_age(mut self, age: Duration) -> Self {
        self.evict_age = age;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = CacheConfig::default();
        assert_eq!(config.freshness_window, Duration::from_secs(300));
        assert_eq!(config.evict_age, Duration::from_secs(600));
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::new()
            .with_freshness_window(Duration::from_secs(30))
            .with_evict_age(Duration::from_secs(90));
        assert_eq!(config.freshness_window, Duration::from_secs(30));
        assert_eq!(config.evict_age, Duration::from_secs(90));
    }
}
