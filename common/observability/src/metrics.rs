use dashmap::DashMap;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

/// Prometheus-backed counters/gauges/histograms named
/// `<prefix>.<subsystem>.<metric>` with labels (service, topic, operation,
/// outcome, ...), as §4.L requires. Generalises the single hard-coded
/// `*Metrics` struct the teacher's services each rolled by hand into one
/// registry any subsystem can register against, keyed by name so repeated
/// `counter()`/`gauge()`/`histogram()` calls for the same metric return the
/// same collector instead of panicking on re-registration.
pub struct MetricsRegistry {
    prefix: String,
    registry: Registry,
    counters: DashMap<String, IntCounterVec>,
    gauges: DashMap<String, IntGaugeVec>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            registry: Registry::new(),
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn full_name(&self, subsystem: &str, metric: &str) -> String {
        format!("{}_{}_{}", self.prefix, subsystem, metric)
    }

    /// Returns the labelled counter vec for `<prefix>.<subsystem>.<metric>`,
    /// registering it on first use.
    pub fn counter(
        &self,
        subsystem: &str,
        metric: &str,
        help: &str,
        label_names: &[&str],
    ) -> IntCounterVec {
        let name = self.full_name(subsystem, metric);
        if let Some(existing) = self.counters.get(&name) {
            return existing.clone();
        }
        let vec = IntCounterVec::new(Opts::new(name.clone(), help), label_names)
            .expect("valid counter metric");
        self.registry
            .register(Box::new(vec.clone()))
            .expect("counter registration does not collide");
        self.counters.insert(name, vec.clone());
        vec
    }

    pub fn gauge(
        &self,
        subsystem: &str,
        metric: &str,
        help: &str,
        label_names: &[&str],
    ) -> IntGaugeVec {
        let name = self.full_name(subsystem, metric);
        if let Some(existing) = self.gauges.get(&name) {
            return existing.clone();
        }
        let vec =
            IntGaugeVec::new(Opts::new(name.clone(), help), label_names).expect("valid gauge metric");
        self.registry
            .register(Box::new(vec.clone()))
            .expect("gauge registration does not collide");
        self.gauges.insert(name, vec.clone());
        vec
    }

    /// Unlabelled histogram; §4.L's "timers" (e.g. cache load time, JWKS
    /// fetch latency, retry-executor attempt duration).
    pub fn histogram(&self, subsystem: &str, metric: &str, help: &str, buckets: Vec<f64>) -> Histogram {
        let name = self.full_name(subsystem, metric);
        if let Some(existing) = self.histograms.get(&name) {
            return existing.clone();
        }
        let histogram = Histogram::with_opts(HistogramOpts::new(name.clone(), help).buckets(buckets))
            .expect("valid histogram metric");
        self.registry
            .register(Box::new(histogram.clone()))
            .expect("histogram registration does not collide");
        self.histograms.insert(name, histogram.clone());
        histogram
    }
}
