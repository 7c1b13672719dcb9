//! Retry, backoff, failure classification and circuit breaking shared by
//! every subsystem that calls out to something that can fail transiently:
//! the JWKS fetcher, the event bus producer/consumer, and the L2 cache
//! client all execute through this crate rather than rolling their own
//! retry loops.

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod error;
pub mod jitter;
pub mod registry;
pub mod retry;

pub use backoff::Backoff;
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerHandle, CircuitBreakerPolicy, CircuitState, Clock,
    MonotonicClock,
};
pub use classifier::{ErrorClassifier, Tagged};
pub use error::{Classify, ErrorClass, ResilienceError, MAX_RETRY_FAILURES};
pub use jitter::Jitter;
pub use registry::CircuitBreakerRegistry;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder, Sleeper, TokioSleeper};
