use std::collections::HashMap;
use std::sync::Mutex;

use relayhub_common::EndpointKey;

pub const DEFAULT_TRIP_THRESHOLD: u32 = 2;

/// Per-endpoint consecutive-failure counter.
///
/// Only failures the retry engine classifies as counting (upstream 5xx,
/// transport and protocol errors) reach `record_failure`; cancellations and
/// local deadlines bypass the breaker entirely.
pub struct CircuitBreaker {
    threshold: u32,
    counters: Mutex<HashMap<EndpointKey, u32>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, key: &EndpointKey) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.remove(key);
    }

    pub fn record_failure(&self, key: &EndpointKey) -> u32 {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn should_trip(&self, key: &EndpointKey) -> bool {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.get(key).is_some_and(|count| *count >= self.threshold)
    }

    /// Clear the counter after a trip so the endpoint can earn trust again
    /// once its temp-disable expires.
    pub fn reset(&self, key: &EndpointKey) {
        self.record_success(key);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_TRIP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EndpointKey {
        EndpointKey::Id(1)
    }

    #[test]
    fn trips_at_threshold() {
        let breaker = CircuitBreaker::new(2);
        assert_eq!(breaker.record_failure(&key()), 1);
        assert!(!breaker.should_trip(&key()));
        assert_eq!(breaker.record_failure(&key()), 2);
        assert!(breaker.should_trip(&key()));
    }

    #[test]
    fn success_resets_counter() {
        let breaker = CircuitBreaker::new(2);
        breaker.record_failure(&key());
        breaker.record_success(&key());
        assert_eq!(breaker.record_failure(&key()), 1);
        assert!(!breaker.should_trip(&key()));
    }

    #[test]
    fn reset_after_trip_clears_state() {
        let breaker = CircuitBreaker::new(2);
        breaker.record_failure(&key());
        breaker.record_failure(&key());
        breaker.reset(&key());
        assert!(!breaker.should_trip(&key()));
    }

    #[test]
    fn counters_are_per_identity() {
        let breaker = CircuitBreaker::new(2);
        breaker.record_failure(&EndpointKey::Id(1));
        assert_eq!(breaker.record_failure(&EndpointKey::Name("b".into())), 1);
    }
}
