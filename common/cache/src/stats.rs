use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

/// Per-cache-name counters (§4.J "Statistics"): hits against each tier,
/// full misses, and a running load-time total used to derive an average.
#[derive(Default)]
struct NameCounters {
    hits_l1: AtomicU64,
    hits_l2: AtomicU64,
    misses: AtomicU64,
    load_count: AtomicU64,
    load_time_micros_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameStatsSnapshot {
    pub hits_l1: u64,
    pub hits_l2: u64,
    pub misses: u64,
    pub load_count: u64,
    pub average_load_time: Duration,
}

/// A registry of [`NameCounters`], one per cache name, created lazily on
/// first use so callers never have to pre-register a name.
#[derive(Default)]
pub struct CacheStats {
    by_name: DashMap<String, NameCounters>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit_l1(&self, name: &str) {
        self.entry(name).hits_l1.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit_l2(&self, name: &str) {
        self.entry(name).hits_l2.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, name: &str) {
        self.entry(name).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_time(&self, name: &str, elapsed: Duration) {
        let counters = self.entry(name);
        counters.load_count.fetch_add(1, Ordering::Relaxed);
        counters
            .load_time_micros_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str) -> NameStatsSnapshot {
        let Some(counters) = self.by_name.get(name) else {
            return NameStatsSnapshot::default();
        };

        let load_count = counters.load_count.load(Ordering::Relaxed);
        let total_micros = counters.load_time_micros_total.load(Ordering::Relaxed);
        let average_load_time = if load_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(total_micros / load_count)
        };

        NameStatsSnapshot {
            hits_l1: counters.hits_l1.load(Ordering::Relaxed),
            hits_l2: counters.hits_l2.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            load_count,
            average_load_time,
        }
    }

    fn entry(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, NameCounters> {
        if !self.by_name.contains_key(name) {
            self.by_name.entry(name.to_string()).or_default();
        }
        self.by_name.get(name).expect("just inserted")
    }
}
