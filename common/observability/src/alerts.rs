use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common_resilience::{CircuitBreakerRegistry, CircuitState, Clock, MonotonicClock};
use tracing::{error, info, warn};

/// §4.L: `open` transitions are critical, `half-open` is high, `closed` is
/// low (recovery, informational).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Low,
    High,
    Critical,
}

trait SeverityFor {
    fn severity(self) -> AlertSeverity;
}

impl SeverityFor for CircuitState {
    fn severity(self) -> AlertSeverity {
        match self {
            CircuitState::Open => AlertSeverity::Critical,
            CircuitState::HalfOpen => AlertSeverity::High,
            CircuitState::Closed => AlertSeverity::Low,
        }
    }
}

/// One breaker state transition observed by a sweep.
#[derive(Debug, Clone)]
pub struct Alert {
    pub service: String,
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub duration_in_previous_state: Duration,
    pub severity: AlertSeverity,
}

/// Where alerts go. The default logs at a level matching severity, the way
/// every teacher service already emits `tracing` events on state changes;
/// swap in another sink (e.g. one that posts to a paging system) in tests
/// or in a binary that wants alerts somewhere other than logs.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &Alert);
}

pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: &Alert) {
        let duration_secs = alert.duration_in_previous_state.as_secs_f64();
        match alert.severity {
            AlertSeverity::Critical => error!(
                service = %alert.service,
                breaker = %alert.breaker,
                from = ?alert.from,
                to = ?alert.to,
                duration_secs,
                "circuit_breaker_alert"
            ),
            AlertSeverity::High => warn!(
                service = %alert.service,
                breaker = %alert.breaker,
                from = ?alert.from,
                to = ?alert.to,
                duration_secs,
                "circuit_breaker_alert"
            ),
            AlertSeverity::Low => info!(
                service = %alert.service,
                breaker = %alert.breaker,
                from = ?alert.from,
                to = ?alert.to,
                duration_secs,
                "circuit_breaker_alert"
            ),
        }
    }
}

struct Observed {
    state: CircuitState,
    entered_at_millis: u64,
}

/// Sweeps a [`CircuitBreakerRegistry`] on a fixed interval (default 30s per
/// §4.L), diffing each breaker's state against what the previous sweep saw
/// and emitting a severity-tagged [`Alert`] for every transition.
pub struct AlertSweeper {
    service: String,
    breakers: Arc<CircuitBreakerRegistry>,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    last_seen: Mutex<HashMap<String, Observed>>,
}

impl AlertSweeper {
    pub fn new(service: impl Into<String>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            service: service.into(),
            breakers,
            sink: Arc::new(TracingAlertSink),
            clock: Arc::new(MonotonicClock::new()),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// One sweep: compares current breaker states against the last sweep's,
    /// emits an alert per transition, and returns them (useful for tests
    /// that don't want to depend on the sink's side effects).
    pub fn sweep_once(&self) -> Vec<Alert> {
        let now = self.clock.now_millis();
        let mut last_seen = self.last_seen.lock().expect("alert sweeper mutex poisoned");
        let mut alerts = Vec::new();

        for (name, handle) in self.breakers.snapshot() {
            let current = handle.state();
            match last_seen.get_mut(&name) {
                Some(observed) if observed.state != current => {
                    let duration = Duration::from_millis(now.saturating_sub(observed.entered_at_millis));
                    let alert = Alert {
                        service: self.service.clone(),
                        breaker: name.clone(),
                        from: observed.state,
                        to: current,
                        duration_in_previous_state: duration,
                        severity: current.severity(),
                    };
                    self.sink.emit(&alert);
                    alerts.push(alert);
                    observed.state = current;
                    observed.entered_at_millis = now;
                }
                Some(_) => {}
                None => {
                    last_seen.insert(
                        name,
                        Observed {
                            state: current,
                            entered_at_millis: now,
                        },
                    );
                }
            }
        }

        alerts
    }

    /// Runs [`sweep_once`] every `interval` (default 30s) until cancelled.
    /// Intended to be spawned as its own task at bootstrap.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.sweep_once();
        }
    }
}

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
