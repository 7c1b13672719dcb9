use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerHandle, CircuitBreakerPolicy};

/// A named collection of circuit breakers, one per downstream dependency
/// (e.g. `"oidc-provider"`, `"redis-l2"`, `"orders-topic"`). Consumed by the
/// alert sweep in `common-observability` to poll every registered breaker's
/// state on a fixed interval.
#[derive(Clone, Default)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, (Arc<CircuitBreakerPolicy>, CircuitBreakerHandle)>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new breaker under `name` with `config`, returning the
    /// policy to execute calls through. If `name` is already registered the
    /// existing policy is returned instead.
    pub fn register_new(&self, name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<CircuitBreakerPolicy> {
        let name = name.into();
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some((policy, _)) = inner.get(&name) {
            return policy.clone();
        }
        let policy = Arc::new(CircuitBreakerPolicy::with_config(config));
        let handle = policy.handle();
        inner.insert(name, (policy.clone(), handle));
        policy
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreakerPolicy>> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .get(name)
            .map(|(policy, _)| policy.clone())
    }

    pub fn reset(&self, name: &str) {
        if let Some((_, handle)) = self.inner.lock().expect("registry mutex poisoned").get(name) {
            handle.reset();
        }
    }

    /// Snapshot of every registered breaker's current state, keyed by name.
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerHandle)> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .map(|(name, (_, handle))| (name.clone(), handle.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;

    #[test]
    fn register_new_is_idempotent_per_name() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.register_new("orders-topic", CircuitBreakerConfig::default());
        let b = registry.register_new("orders-topic", CircuitBreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn snapshot_reflects_registered_breakers() {
        let registry = CircuitBreakerRegistry::new();
        registry.register_new("a", CircuitBreakerConfig::default());
        registry.register_new("b", CircuitBreakerConfig::default());
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|(_, h)| h.state() == CircuitState::Closed));
    }

    #[test]
    fn reset_restores_closed_state() {
        let registry = CircuitBreakerRegistry::new();
        registry.register_new("c", CircuitBreakerConfig::default());
        registry.reset("c");
        assert_eq!(registry.get("c").unwrap().state(), CircuitState::Closed);
    }
}
