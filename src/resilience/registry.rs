//! Named circuit breaker registry.
//!
//! Built once at startup and shared by `Arc`, so every call site touching the
//! same dependency shares one breaker and therefore one fate.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{CircuitBreakerSettings, OpsConfig};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};

/// Get-or-create store of breakers keyed by dependency name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: CircuitBreakerSettings,
    overrides: HashMap<String, CircuitBreakerSettings>,
}

impl CircuitBreakerRegistry {
    pub fn new(
        defaults: CircuitBreakerSettings,
        overrides: HashMap<String, CircuitBreakerSettings>,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            overrides,
        }
    }

    pub fn from_config(config: &OpsConfig) -> Self {
        Self::new(config.circuit_breaker.clone(), config.breakers.clone())
    }

    /// Return the breaker for `name`, creating it from config on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let settings = self.overrides.get(name).unwrap_or(&self.defaults);
                tracing::debug!(breaker = %name, threshold = settings.failure_threshold, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, CircuitBreakerConfig::from(settings)))
            })
            .value()
            .clone()
    }

    /// Return the breaker for `name` without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.value().clone())
    }

    /// Stats for every known breaker, sorted by name.
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|b| b.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Close every breaker.
    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.value().force_close();
        }
        tracing::info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    /// Close one breaker. Returns false if no breaker has that name.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.force_close();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;

    fn registry() -> CircuitBreakerRegistry {
        let mut overrides = HashMap::new();
        overrides.insert(
            "database".to_string(),
            CircuitBreakerSettings {
                failure_threshold: 2,
                ..Default::default()
            },
        );
        CircuitBreakerRegistry::new(CircuitBreakerSettings::default(), overrides)
    }

    #[test]
    fn test_same_name_shares_breaker() {
        let reg = registry();
        let a = reg.get_or_create("email");
        let b = reg.get_or_create("email");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("sms").is_none());
    }

    #[test]
    fn test_overrides_apply_per_name() {
        let reg = registry();
        assert_eq!(reg.get_or_create("database").config().failure_threshold, 2);
        assert_eq!(reg.get_or_create("email").config().failure_threshold, 5);
    }

    #[tokio::test]
    async fn test_reset_all_and_stats() {
        let reg = registry();
        reg.get_or_create("database").force_open();
        reg.get_or_create("billing").force_open();

        let stats = reg.all_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "billing");
        assert!(stats.iter().all(|s| s.state == CircuitState::Open));

        assert!(reg.reset("billing"));
        assert!(!reg.reset("missing"));
        assert_eq!(reg.get("billing").unwrap().state(), CircuitState::Closed);

        reg.reset_all();
        assert!(reg.all_stats().iter().all(|s| s.state == CircuitState::Closed));
    }
}
