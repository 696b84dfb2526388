//! Cache traffic counters.

use std::fmt;

/// Counters describing memory-tier cache traffic.
///
/// Snapshots are taken under the cache lock, so the fields in one snapshot
/// are mutually consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed by the eviction policy.
    pub evictions: u64,
    /// Evicted entries handed to the persistent tier.
    pub spills: u64,
}

impl CacheStats {
    /// Hit rate over all lookups, or 0.0 before any traffic.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} spills={} hit_rate={:.1}%",
            self.hits,
            self.misses,
            self.evictions,
            self.spills,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_traffic() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            hits: 1,
            misses: 1,
            evictions: 2,
            spills: 2,
        };
        let text = stats.to_string();
        assert!(text.contains("evictions=2"));
        assert!(text.contains("50.0%"));
    }
}
