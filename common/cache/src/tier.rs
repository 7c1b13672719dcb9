use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{CacheError, CacheResult};

/// The remote (L2) half of the two-tier cache (§4.J). Implementations own
/// their own notion of TTL bookkeeping; `get` returns the value's remaining
/// TTL so the caller can repopulate L1 with `min(L1-TTL, remaining)`.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Duration)>>;
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
    /// Best-effort removal of every key under `prefix` (§4.J `clear`).
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<()>;
}

/// Distributed L2 tier backed by Redis, grounded in the same
/// `ConnectionManager`/`AsyncCommands` pattern used for rate-limit counters
/// elsewhere in this fleet.
#[derive(Clone)]
pub struct RedisTier {
    manager: ConnectionManager,
}

impl RedisTier {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| CacheError::L2("connect".into(), err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| CacheError::L2("connect".into(), err.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl RemoteTier for RedisTier {
    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Duration)>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|err| CacheError::L2(key.to_string(), err.to_string()))?;
        let Some(value) = value else {
            return Ok(None);
        };

        let remaining_secs: i64 = conn
            .ttl(key)
            .await
            .map_err(|err| CacheError::L2(key.to_string(), err.to_string()))?;
        let remaining = if remaining_secs > 0 {
            Duration::from_secs(remaining_secs as u64)
        } else {
            Duration::ZERO
        };
        Ok(Some((value, remaining)))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| CacheError::L2(key.to_string(), err.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|err| CacheError::L2(key.to_string(), err.to_string()))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|err| CacheError::L2(prefix.to_string(), err.to_string()))?;
        if keys.is_empty() {
            return Ok(());
        }
        let _: () = conn
            .del(keys)
            .await
            .map_err(|err| CacheError::L2(prefix.to_string(), err.to_string()))?;
        Ok(())
    }
}

/// In-process stand-in for the remote tier, used in tests the same way
/// `InMemoryRateLimiter` stands in for Redis elsewhere in this fleet.
#[derive(Clone, Default)]
pub struct InMemoryRemoteTier {
    inner: Arc<Mutex<HashMap<String, (Vec<u8>, Instant, Duration)>>>,
}

impl InMemoryRemoteTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteTier for InMemoryRemoteTier {
    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Duration)>> {
        let mut guard = self.inner.lock().await;
        let Some((value, inserted_at, ttl)) = guard.get(key).cloned() else {
            return Ok(None);
        };
        let elapsed = inserted_at.elapsed();
        if elapsed >= ttl {
            guard.remove(key);
            return Ok(None);
        }
        Ok(Some((value, ttl - elapsed)))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut guard = self.inner.lock().await;
        guard.insert(key.to_string(), (value.to_vec(), Instant::now(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut guard = self.inner.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<()> {
        let mut guard = self.inner.lock().await;
        guard.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
