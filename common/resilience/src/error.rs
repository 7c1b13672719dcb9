use std::fmt;
use std::time::Duration;

/// Classification assigned to a failure before the retry executor or the
/// circuit breaker decide what to do with it.
///
/// Mirrors the taxonomy every caller of `common-resilience` is expected to
/// map its own errors onto via [`Classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Likely to succeed on retry (timeouts, connection resets, 5xx).
    Transient,
    /// Will not succeed on retry no matter how many attempts (4xx, bad
    /// credentials, schema mismatches).
    Permanent,
    /// Classifier has no rule for this error; treated as transient for
    /// retry purposes but never silently swallowed.
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Permanent)
    }
}

/// Anything the retry executor and circuit breaker can act on must expose
/// its classification. Implemented by each subsystem's own error type
/// (`common-messaging`'s dispatch error, `common-auth`'s fetch error, ...).
pub trait Classify {
    fn error_class(&self) -> ErrorClass;
}

/// Cap on how many individual failures a [`ResilienceError::RetryExhausted`]
/// will retain; beyond this the oldest failures are dropped rather than let
/// a pathological retry loop grow the error unbounded.
pub const MAX_RETRY_FAILURES: usize = 10;

/// The error type returned by every `common-resilience` execution wrapper.
/// Generic over the inner operation's own error type `E`.
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The circuit is open; the call was rejected without being attempted.
    CircuitOpen {
        failure_count: usize,
        open_duration: Duration,
    },
    /// All configured attempts were used up without success.
    RetryExhausted {
        attempts: usize,
        failures: Vec<E>,
    },
    /// The operation's own error, surfaced without modification (used when
    /// the classifier marks it permanent and no retry is attempted).
    Inner(E),
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            ResilienceError::CircuitOpen {
                failure_count,
                open_duration,
            } => ResilienceError::CircuitOpen {
                failure_count: *failure_count,
                open_duration: *open_duration,
            },
            ResilienceError::RetryExhausted { attempts, failures } => {
                ResilienceError::RetryExhausted {
                    attempts: *attempts,
                    failures: failures.clone(),
                }
            }
            ResilienceError::Inner(e) => ResilienceError::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ResilienceError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ResilienceError::CircuitOpen {
                    failure_count: a,
                    open_duration: b,
                },
                ResilienceError::CircuitOpen {
                    failure_count: c,
                    open_duration: d,
                },
            ) => a == c && b == d,
            (
                ResilienceError::RetryExhausted {
                    attempts: a,
                    failures: af,
                },
                ResilienceError::RetryExhausted {
                    attempts: b,
                    failures: bf,
                },
            ) => a == b && af == bf,
            (ResilienceError::Inner(a), ResilienceError::Inner(b)) => a == b,
            _ => false,
        }
    }
}
impl<E: Eq> Eq for ResilienceError<E> {}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::CircuitOpen {
                failure_count,
                open_duration,
            } => write!(
                f,
                "circuit open after {failure_count} failures, open for {open_duration:?}"
            ),
            ResilienceError::RetryExhausted { attempts, failures } => write!(
                f,
                "retry exhausted after {attempts} attempts, last error: {}",
                failures
                    .last()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "<none>".to_string())
            ),
            ResilienceError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl<E> ResilienceError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetryExhausted { .. })
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, ResilienceError::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::Inner(e) => Some(e),
            ResilienceError::RetryExhausted { mut failures, .. } => failures.pop(),
            ResilienceError::CircuitOpen { .. } => None,
        }
    }

    pub fn failures(&self) -> &[E] {
        match self {
            ResilienceError::RetryExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}
