use std::collections::HashMap;
use std::time::Duration;

/// L1/L2 TTL pair for one cache name (§6 "Cache" group).
#[derive(Debug, Clone, Copy)]
pub struct TtlPair {
    pub l1: Duration,
    pub l2: Duration,
}

impl TtlPair {
    pub const fn new(l1_secs: u64, l2_secs: u64) -> Self {
        Self {
            l1: Duration::from_secs(l1_secs),
            l2: Duration::from_secs(l2_secs),
        }
    }
}

/// Recognised names and their default TTLs (§6 "Cache"). A name absent from
/// this table falls back to [`CacheConfig::default_ttl`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub l1_max_size: u64,
    pub default_ttl: TtlPair,
    pub named_ttls: HashMap<String, TtlPair>,
    pub redis_url: Option<String>,
}

impl CacheConfig {
    pub fn ttl_for(&self, name: &str) -> TtlPair {
        self.named_ttls.get(name).copied().unwrap_or(self.default_ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut named_ttls = HashMap::new();
        named_ttls.insert("user-info".to_string(), TtlPair::new(5 * 60, 10 * 60));
        named_ttls.insert("user-by-id".to_string(), TtlPair::new(10 * 60, 15 * 60));
        named_ttls.insert("all-users".to_string(), TtlPair::new(2 * 60, 5 * 60));
        named_ttls.insert("user-roles".to_string(), TtlPair::new(15 * 60, 30 * 60));

        Self {
            enabled: true,
            l1_max_size: 10_000,
            default_ttl: TtlPair::new(5 * 60, 10 * 60),
            named_ttls,
            redis_url: None,
        }
    }
}

impl CacheConfig {
    /// Reads the `cache.*` group from environment variables (§6), falling
    /// back to [`CacheConfig::default`] for anything unset. Per-name TTL
    /// overrides are read as `CACHE_TTL_<NAME>_L1_SECONDS` /
    /// `..._L2_SECONDS` with `<NAME>` upper-cased and `-` replaced by `_`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enabled = std::env::var("CACHE_ENABLED")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(defaults.enabled);
        let l1_max_size = std::env::var("CACHE_L1_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.l1_max_size);
        let redis_url = std::env::var("CACHE_REDIS_URL").ok();

        let mut named_ttls = defaults.named_ttls.clone();
        for name in named_ttls.clone().keys() {
            let env_name = name.to_uppercase().replace('-', "_");
            let l1 = std::env::var(format!("CACHE_TTL_{env_name}_L1_SECONDS"))
                .ok()
                .and_then(|v| v.parse().ok());
            let l2 = std::env::var(format!("CACHE_TTL_{env_name}_L2_SECONDS"))
                .ok()
                .and_then(|v| v.parse().ok());
            if let (Some(l1), Some(l2)) = (l1, l2) {
                named_ttls.insert(name.clone(), TtlPair::new(l1, l2));
            }
        }

        Self {
            enabled,
            l1_max_size,
            default_ttl: defaults.default_ttl,
            named_ttls,
            redis_url,
        }
    }
}
