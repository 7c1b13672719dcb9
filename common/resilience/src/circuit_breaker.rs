use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::ResilienceError;

/// Abstraction over wall-clock time so breaker timeout tests don't need to
/// sleep for real.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

pub struct MonotonicClock {
    start: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Configuration for the windowed failure-rate circuit breaker.
///
/// The breaker trips from Closed to Open when, over the most recent
/// `window_size` recorded outcomes, at least `minimum_calls` outcomes have
/// been observed and the failure rate among them is `>= failure_rate_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub minimum_calls: usize,
    pub failure_rate_threshold: f64,
    pub open_duration: Duration,
    pub half_open_max_calls: usize,
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            window_size: 1,
            minimum_calls: usize::MAX,
            failure_rate_threshold: 1.1,
            open_duration: Duration::from_secs(0),
            half_open_max_calls: 0,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            minimum_calls: 10,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(30),
            half_open_max_calls: 5,
        }
    }
}

pub struct CircuitBreakerState {
    state: AtomicU8,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
    half_open_successes: AtomicUsize,
    outcomes: Mutex<VecDeque<bool>>,
    total_failures: AtomicUsize,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls: AtomicUsize::new(0),
            half_open_successes: AtomicUsize::new(0),
            outcomes: Mutex::new(VecDeque::new()),
            total_failures: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// A registered, shareable handle to a single named breaker's state, used
/// by `common-observability`'s alert sweep to read transitions without
/// holding a reference to the policy that owns the config.
#[derive(Clone)]
pub struct CircuitBreakerHandle {
    state: Arc<CircuitBreakerState>,
}

impl CircuitBreakerHandle {
    pub fn state(&self) -> CircuitState {
        self.state.snapshot()
    }

    pub fn reset(&self) {
        self.state
            .state
            .store(CircuitState::Closed as u8, Ordering::SeqCst);
        self.state.half_open_calls.store(0, Ordering::SeqCst);
        self.state.half_open_successes.store(0, Ordering::SeqCst);
        self.state.total_failures.store(0, Ordering::SeqCst);
    }
}

/// Windowed failure-rate circuit breaker, with the same atomic
/// state-machine shape used throughout this subsystem: a compare-and-swap
/// loop drives transitions instead of a mutex around the whole state.
pub struct CircuitBreakerPolicy {
    state: Arc<CircuitBreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerPolicy {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(CircuitBreakerState::new()),
            config,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> CircuitBreakerHandle {
        CircuitBreakerHandle {
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.snapshot()
    }

    pub async fn execute<T, E, Fut, Op>(&self, op: Op) -> Result<T, ResilienceError<E>>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        match op().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(ResilienceError::Inner(err))
            }
        }
    }

    fn admit<E>(&self) -> Result<(), ResilienceError<E>> {
        loop {
            let current = self.state.snapshot();
            match current {
                CircuitState::Closed => return Ok(()),
                CircuitState::Open => {
                    let opened_at = self.state.opened_at_millis.load(Ordering::SeqCst);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    if elapsed >= self.config.open_duration.as_millis() as u64 {
                        if self
                            .state
                            .state
                            .compare_exchange(
                                CircuitState::Open as u8,
                                CircuitState::HalfOpen as u8,
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok()
                        {
                            self.state.half_open_calls.store(0, Ordering::SeqCst);
                            self.state.half_open_successes.store(0, Ordering::SeqCst);
                            info!("circuit_breaker half_open");
                        }
                        continue;
                    }
                    return Err(ResilienceError::CircuitOpen {
                        failure_count: self.state.total_failures.load(Ordering::SeqCst),
                        open_duration: self.config.open_duration,
                    });
                }
                CircuitState::HalfOpen => {
                    let in_flight = self.state.half_open_calls.fetch_add(1, Ordering::SeqCst);
                    if in_flight >= self.config.half_open_max_calls {
                        self.state.half_open_calls.fetch_sub(1, Ordering::SeqCst);
                        return Err(ResilienceError::CircuitOpen {
                            failure_count: self.state.total_failures.load(Ordering::SeqCst),
                            open_duration: self.config.open_duration,
                        });
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn record_outcome(&self, success: bool) {
        let mut outcomes = self.state.outcomes.lock().await;
        outcomes.push_back(success);
        while outcomes.len() > self.config.window_size {
            outcomes.pop_front();
        }
    }

    async fn failure_rate(&self) -> Option<f64> {
        let outcomes = self.state.outcomes.lock().await;
        if outcomes.len() < self.config.minimum_calls {
            return None;
        }
        let failures = outcomes.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / outcomes.len() as f64)
    }

    fn open(&self) {
        self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::SeqCst);
        self.state.state.store(CircuitState::Open as u8, Ordering::SeqCst);
        info!("circuit_breaker open");
    }

    async fn on_success(&self) {
        self.record_outcome(true).await;
        if self.state.snapshot() == CircuitState::HalfOpen {
            let successes = self.state.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.half_open_max_calls {
                self.state.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
                self.state.total_failures.store(0, Ordering::SeqCst);
                info!("circuit_breaker closed");
            }
        }
    }

    async fn on_failure(&self) {
        self.record_outcome(false).await;
        self.state.total_failures.fetch_add(1, Ordering::SeqCst);
        match self.state.snapshot() {
            CircuitState::HalfOpen => self.open(),
            CircuitState::Closed => {
                if let Some(rate) = self.failure_rate().await {
                    if rate >= self.config.failure_rate_threshold {
                        self.open();
                    }
                }
            }
            CircuitState::Open => {}
        }
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    struct ManualClock {
        millis: StdAtomicU64,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                millis: StdAtomicU64::new(0),
            })
        }

        fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.millis.load(Ordering::SeqCst)
        }
    }

    fn small_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 10,
            minimum_calls: 4,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(10),
            half_open_max_calls: 2,
        }
    }

    async fn fail(policy: &CircuitBreakerPolicy) {
        let _ = policy
            .execute(|| async { Err::<(), _>("boom") })
            .await;
    }

    async fn succeed(policy: &CircuitBreakerPolicy) {
        policy
            .execute(|| async { Ok::<_, &str>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stays_closed_below_minimum_calls() {
        let policy = CircuitBreakerPolicy::with_config(small_config());
        fail(&policy).await;
        fail(&policy).await;
        fail(&policy).await;
        assert_eq!(policy.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_when_failure_rate_crosses_threshold() {
        let policy = CircuitBreakerPolicy::with_config(small_config());
        fail(&policy).await;
        fail(&policy).await;
        fail(&policy).await;
        fail(&policy).await;
        assert_eq!(policy.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn mixed_outcomes_below_rate_stay_closed() {
        let policy = CircuitBreakerPolicy::with_config(small_config());
        succeed(&policy).await;
        succeed(&policy).await;
        succeed(&policy).await;
        fail(&policy).await;
        assert_eq!(policy.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_calls() {
        let policy = CircuitBreakerPolicy::with_config(small_config());
        for _ in 0..4 {
            fail(&policy).await;
        }
        assert_eq!(policy.state(), CircuitState::Open);
        let result = policy.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_timeout() {
        let clock = ManualClock::new();
        let policy = CircuitBreakerPolicy::with_config(small_config()).with_clock(clock.clone());
        for _ in 0..4 {
            fail(&policy).await;
        }
        assert_eq!(policy.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(11));
        let result = policy.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn half_open_closes_after_enough_successes() {
        let clock = ManualClock::new();
        let policy = CircuitBreakerPolicy::with_config(small_config()).with_clock(clock.clone());
        for _ in 0..4 {
            fail(&policy).await;
        }
        clock.advance(Duration::from_secs(11));
        succeed(&policy).await;
        succeed(&policy).await;
        assert_eq!(policy.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let clock = ManualClock::new();
        let policy = CircuitBreakerPolicy::with_config(small_config()).with_clock(clock.clone());
        for _ in 0..4 {
            fail(&policy).await;
        }
        clock.advance(Duration::from_secs(11));
        fail(&policy).await;
        assert_eq!(policy.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_limits_concurrent_probes() {
        let clock = ManualClock::new();
        let policy = CircuitBreakerPolicy::with_config(small_config()).with_clock(clock.clone());
        for _ in 0..4 {
            fail(&policy).await;
        }
        clock.advance(Duration::from_secs(11));
        // first admit transitions to half-open and consumes one slot
        let a = policy.admit::<&str>();
        let b = policy.admit::<&str>();
        let c = policy.admit::<&str>();
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(c.is_err());
    }

    #[tokio::test]
    async fn disabled_breaker_never_trips() {
        let policy = CircuitBreakerPolicy::with_config(CircuitBreakerConfig::disabled());
        for _ in 0..50 {
            fail(&policy).await;
        }
        assert_eq!(policy.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn handle_reports_same_state_as_policy() {
        let policy = CircuitBreakerPolicy::with_config(small_config());
        let handle = policy.handle();
        for _ in 0..4 {
            fail(&policy).await;
        }
        assert_eq!(handle.state(), CircuitState::Open);
    }
}
