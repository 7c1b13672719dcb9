//! Metrics and alerting shared across the fleet (§4.L): a labelled
//! counter/gauge/histogram registry plus a scheduled sweep over registered
//! circuit breakers that turns state transitions into severity-tagged
//! alerts.

pub mod alerts;
pub mod metrics;

pub use alerts::{Alert, AlertSeverity, AlertSink, AlertSweeper, TracingAlertSink, DEFAULT_SWEEP_INTERVAL};
pub use metrics::MetricsRegistry;
