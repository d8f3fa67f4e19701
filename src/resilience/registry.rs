//! Default process-wide registries for circuit breakers and bulkheads.
//!
//! Creation is idempotent by name: `get_or_create` called twice for the
//! same name returns the same `Arc`, and config passed on the second call
//! is ignored (spec §5, §8 idempotence property).

use super::bulkhead::Bulkhead;
use super::circuit_breaker::CircuitBreaker;
use super::config::{BulkheadConfig, CircuitBreakerConfig};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    fn new() -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.breakers.lock().keys().cloned().collect()
    }
}

pub struct BulkheadRegistry {
    bulkheads: Mutex<HashMap<String, Arc<Bulkhead>>>,
}

impl BulkheadRegistry {
    fn new() -> Self {
        Self {
            bulkheads: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str, config: BulkheadConfig) -> Arc<Bulkhead> {
        let mut bulkheads = self.bulkheads.lock();
        bulkheads
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Bulkhead::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bulkhead>> {
        self.bulkheads.lock().get(name).cloned()
    }
}

lazy_static! {
    pub static ref CIRCUIT_BREAKERS: CircuitBreakerRegistry = CircuitBreakerRegistry::new();
    pub static ref BULKHEADS: BulkheadRegistry = BulkheadRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_and_ignores_later_config() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create(
            "quote-feed",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        );
        let b = registry.get_or_create(
            "quote-feed",
            CircuitBreakerConfig {
                failure_threshold: 99,
                ..CircuitBreakerConfig::default()
            },
        );
        assert!(Arc::ptr_eq(&a, &b));
    }
}
