use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::error::{ErrorClass, ResilienceError, MAX_RETRY_FAILURES};
use crate::jitter::Jitter;

/// Abstraction over `tokio::time::sleep` so tests can run without real
/// delays by swapping in a tracking fake.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A retry policy: how many attempts to make, how long to wait between
/// them, and which failures are worth retrying at all.
///
/// `classify` decides retryability per attempt. When it returns
/// [`ErrorClass::Permanent`] the executor stops immediately instead of
/// burning through the remaining attempt budget.
#[derive(Clone)]
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    classify: Arc<dyn Fn(&E) -> ErrorClass + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Run `op` until it succeeds, a permanent failure is classified, or
    /// `max_attempts` is exhausted, sleeping between attempts per the
    /// configured backoff and jitter.
    pub async fn execute<T, Fut, Op>(&self, mut op: Op) -> Result<T, ResilienceError<E>>
    where
        Op: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut failures: Vec<E> = Vec::new();
        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let class = (self.classify)(&err);
                    let failed_count = attempt + 1;
                    warn!(attempt = failed_count, ?class, "attempt failed");
                    let permanent = matches!(class, ErrorClass::Permanent);
                    if failures.len() >= MAX_RETRY_FAILURES {
                        failures.remove(0);
                    }
                    failures.push(err);
                    if permanent || failed_count >= self.max_attempts {
                        return Err(ResilienceError::RetryExhausted {
                            attempts: failed_count,
                            failures,
                        });
                    }
                    let delay = self.jitter.apply(self.backoff.delay(failed_count));
                    self.sleeper.sleep(delay).await;
                }
            }
        }
        Err(ResilienceError::RetryExhausted {
            attempts: self.max_attempts,
            failures,
        })
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
}

pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    classify: Option<Arc<dyn Fn(&E) -> ErrorClass + Send + Sync>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10)),
            jitter: Jitter::Symmetric { factor: 0.2 },
            classify: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Result<Self, BuildError> {
        if attempts == 0 {
            return Err(BuildError::ZeroAttempts);
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn classify_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> ErrorClass + Send + Sync + 'static,
    {
        self.classify = Some(Arc::new(f));
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            classify: self
                .classify
                .unwrap_or_else(|| Arc::new(|_: &E| ErrorClass::Unknown)),
            sleeper: self.sleeper,
        }
    }
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct FakeError(&'static str);

    struct TrackingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl TrackingSleeper {
        fn new() -> Self {
            Self {
                sleeps: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Sleeper for TrackingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().await.push(duration);
        }
    }

    #[tokio::test]
    async fn succeeds_first_attempt_without_sleeping() {
        let sleeper = Arc::new(TrackingSleeper::new());
        let policy: RetryPolicy<FakeError> = RetryPolicy::builder()
            .max_attempts(3)
            .unwrap()
            .sleeper(sleeper.clone())
            .build();

        let result = policy.execute(|_| async { Ok::<_, FakeError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.sleeps.lock().await.is_empty());
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sleeper = Arc::new(TrackingSleeper::new());
        let policy: RetryPolicy<FakeError> = RetryPolicy::builder()
            .max_attempts(5)
            .unwrap()
            .jitter(Jitter::None)
            .classify_with(|_| ErrorClass::Transient)
            .sleeper(sleeper.clone())
            .build();

        let calls2 = calls.clone();
        let result = policy
            .execute(move |_| {
                let calls2 = calls2.clone();
                async move {
                    let n = calls2.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(FakeError("boom"))
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.sleeps.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<FakeError> = RetryPolicy::builder()
            .max_attempts(5)
            .unwrap()
            .classify_with(|_| ErrorClass::Permanent)
            .build();

        let calls2 = calls.clone();
        let result = policy
            .execute(move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
                async move { Err::<i32, _>(FakeError("nope")) }
            })
            .await;

        assert!(result.unwrap_err().is_retry_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_all_failures() {
        let policy: RetryPolicy<FakeError> = RetryPolicy::builder()
            .max_attempts(3)
            .unwrap()
            .jitter(Jitter::None)
            .classify_with(|_| ErrorClass::Transient)
            .build();

        let result = policy
            .execute(|_| async { Err::<i32, _>(FakeError("still broken")) })
            .await;

        match result {
            Err(ResilienceError::RetryExhausted { attempts, failures }) => {
                assert_eq!(attempts, 3);
                assert_eq!(failures.len(), 3);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_attempts_rejected_by_builder() {
        let result: Result<RetryPolicyBuilder<FakeError>, _> =
            RetryPolicy::builder().max_attempts(0);
        assert!(result.is_err());
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
