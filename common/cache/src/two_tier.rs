use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache as MokaCache;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::stats::{CacheStats, NameStatsSnapshot};
use crate::tier::RemoteTier;

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Whether an `evict`/`clear` fully, partially, or not at all succeeded
/// (§4.J: "reports partial failure but does not roll back").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub l1_ok: bool,
    pub l2_ok: bool,
}

impl RemovalOutcome {
    pub fn is_full_success(&self) -> bool {
        self.l1_ok && self.l2_ok
    }
}

/// The two-tier cache (§3.8, §4.J): a bounded local L1 in front of a
/// distributed L2, keyed by cache name + logical key. One L1 [`MokaCache`]
/// is created per name on first use, capped at that name's configured L1
/// TTL; per-entry logical expiry (`StoredEntry::expires_at`) lets a single
/// entry live for LESS than that cap, which is how L1 repopulation honours
/// `min(L1-TTL, remaining-L2-TTL)` without rebuilding the cache per put.
pub struct TwoTierCache {
    config: CacheConfig,
    l1_by_name: DashMap<String, MokaCache<String, StoredEntry>>,
    l2: Arc<dyn RemoteTier>,
    stats: CacheStats,
}

impl TwoTierCache {
    pub fn new(config: CacheConfig, l2: Arc<dyn RemoteTier>) -> Self {
        Self {
            config,
            l1_by_name: DashMap::new(),
            l2,
            stats: CacheStats::new(),
        }
    }

    pub fn stats(&self, name: &str) -> NameStatsSnapshot {
        self.stats.snapshot(name)
    }

    /// `get(name, key)` (§4.J).
    pub async fn get(&self, name: &str, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let l1 = self.l1_for(name);

        if let Some(entry) = l1.get(key).await {
            if entry.expires_at > Instant::now() {
                self.stats.record_hit_l1(name);
                return Ok(Some(entry.bytes));
            }
            l1.invalidate(key).await;
        }

        let composite_key = composite_key(name, key);
        match self.l2.get(&composite_key).await? {
            Some((bytes, remaining)) => {
                self.stats.record_hit_l2(name);
                let l1_ttl = self.config.ttl_for(name).l1.min(remaining);
                l1.insert(
                    key.to_string(),
                    StoredEntry {
                        bytes: bytes.clone(),
                        expires_at: Instant::now() + l1_ttl,
                    },
                )
                .await;
                Ok(Some(bytes))
            }
            None => {
                self.stats.record_miss(name);
                Ok(None)
            }
        }
    }

    /// `put(name, key, value, ttl)` (§4.J): write-through to L2 with `ttl`,
    /// then L1 with `min(ttl, L1-max-TTL)`.
    pub async fn put(&self, name: &str, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let composite_key = composite_key(name, key);
        self.l2.put(&composite_key, &value, ttl).await?;

        let l1_ttl = self.config.ttl_for(name).l1.min(ttl);
        self.l1_for(name)
            .insert(
                key.to_string(),
                StoredEntry {
                    bytes: value,
                    expires_at: Instant::now() + l1_ttl,
                },
            )
            .await;
        Ok(())
    }

    /// Convenience over [`TwoTierCache::put`] using the configured default
    /// TTL for `name` (§6 "Cache" TTL table).
    pub async fn put_with_default_ttl(&self, name: &str, key: &str, value: Vec<u8>) -> CacheResult<()> {
        let ttl = self.config.ttl_for(name).l2;
        self.put(name, key, value, ttl).await
    }

    /// `evict(name, key)` (§4.J): removal is attempted on both tiers even
    /// if one fails; never rolls back the side that succeeded.
    pub async fn evict(&self, name: &str, key: &str) -> CacheResult<RemovalOutcome> {
        let l1 = self.l1_for(name);
        l1.invalidate(key).await;

        let composite_key = composite_key(name, key);
        let l2_ok = match self.l2.delete(&composite_key).await {
            Ok(()) => true,
            Err(err) => {
                debug!(name, key, error = %err, "L2 evict failed");
                false
            }
        };

        Ok(RemovalOutcome {
            l1_ok: true,
            l2_ok,
        })
    }

    /// `clear(name)` (§4.J): best-effort clear of both tiers for `name`.
    pub async fn clear(&self, name: &str) -> CacheResult<RemovalOutcome> {
        let l1_ok = if let Some(l1) = self.l1_by_name.get(name) {
            l1.invalidate_all();
            true
        } else {
            true
        };

        let prefix = format!("{name}:");
        let l2_ok = match self.l2.delete_prefix(&prefix).await {
            Ok(()) => true,
            Err(err) => {
                debug!(name, error = %err, "L2 clear failed");
                false
            }
        };

        Ok(RemovalOutcome { l1_ok, l2_ok })
    }

    fn l1_for(&self, name: &str) -> MokaCache<String, StoredEntry> {
        if let Some(existing) = self.l1_by_name.get(name) {
            return existing.clone();
        }

        let ttl = self.config.ttl_for(name).l1;
        let built = MokaCache::builder()
            .max_capacity(self.config.l1_max_size)
            .time_to_live(ttl)
            .build();
        self.l1_by_name.insert(name.to_string(), built.clone());
        built
    }
}

fn composite_key(name: &str, key: &str) -> String {
    format!("{name}:{key}")
}
