use std::time::Duration;

use common_resilience::{Backoff, Jitter};

/// `retry.*` (§6). Bridges the environment-driven configuration group onto
/// a [`common_resilience::RetryPolicy`] builder once the caller supplies a
/// classifier for its own error type.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
    pub enable_dlq: bool,
    pub dlq_topic_suffix: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.1,
            enable_dlq: true,
            dlq_topic_suffix: ".dlq".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            initial_backoff: Duration::from_millis(env_parse("RETRY_INITIAL_BACKOFF_MS", defaults.initial_backoff.as_millis() as u64)),
            max_backoff: Duration::from_millis(env_parse("RETRY_MAX_BACKOFF_MS", defaults.max_backoff.as_millis() as u64)),
            multiplier: env_parse("RETRY_MULTIPLIER", defaults.multiplier),
            jitter_factor: env_parse("RETRY_JITTER_FACTOR", defaults.jitter_factor),
            enable_dlq: std::env::var("RETRY_ENABLE_DLQ")
                .ok()
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.enable_dlq),
            dlq_topic_suffix: std::env::var("RETRY_DLQ_TOPIC_SUFFIX").unwrap_or(defaults.dlq_topic_suffix),
        }
    }

    /// The `Backoff`/`Jitter` pair this config describes, ready to plug
    /// into a `RetryPolicy` builder alongside a per-error-type classifier.
    pub fn backoff_and_jitter(&self) -> (Backoff, Jitter) {
        let backoff = Backoff::exponential_with_multiplier(
            self.initial_backoff,
            self.max_backoff,
            self.multiplier,
        );
        let jitter = Jitter::Symmetric {
            factor: self.jitter_factor.clamp(0.0, 1.0),
        };
        (backoff, jitter)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `messaging.*` bootstrap configuration, read the same
/// `env::var(...).unwrap_or_else(...)` way `audit-consumer`'s `main.rs`
/// reads `KAFKA_BOOTSTRAP`/`AUDIT_TOPIC`.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub bootstrap_servers: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            connect_timeout: Duration::from_secs(2),
            total_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl MessagingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bootstrap_servers: std::env::var("KAFKA_BOOTSTRAP").unwrap_or(defaults.bootstrap_servers),
            connect_timeout: Duration::from_millis(env_parse("MESSAGING_CONNECT_TIMEOUT_MS", defaults.connect_timeout.as_millis() as u64)),
            total_timeout: Duration::from_millis(env_parse("MESSAGING_TOTAL_TIMEOUT_MS", defaults.total_timeout.as_millis() as u64)),
            retry: RetryConfig::from_env(),
        }
    }
}
