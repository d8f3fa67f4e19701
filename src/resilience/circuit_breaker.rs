//! Circuit breaker: CLOSED -> OPEN -> HALF_OPEN state machine wrapping an
//! outbound call. See spec §4.1.

use super::config::CircuitBreakerConfig;
use crate::error::CoreError;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerCounters {
    pub failures: u32,
    pub successes: u32,
    pub total: u64,
    pub rejected: u64,
}

struct Inner {
    state: BreakerState,
    counters: BreakerCounters,
    last_failure_time: Option<Instant>,
    half_open_inflight: u32,
}

/// A single named circuit. All mutations are serialized under `inner`'s lock.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Result of a wrapped call: either the circuit rejected it outright, or it
/// ran and the underlying error (if any) is returned unchanged.
pub enum CallOutcome<T, E> {
    Ok(T),
    Rejected(CoreError),
    Failed(E),
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counters: BreakerCounters::default(),
                last_failure_time: None,
                half_open_inflight: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advance OPEN -> HALF_OPEN if `recovery_timeout` has elapsed. Called
    /// at the start of every inspection so state reads are self-healing.
    fn refresh(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(last) = inner.last_failure_time {
                if last.elapsed() >= self.config.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_inflight = 0;
                }
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub fn counters(&self) -> BreakerCounters {
        self.inner.lock().counters
    }

    fn remaining_recovery_secs(&self, inner: &Inner) -> f64 {
        match inner.last_failure_time {
            Some(last) => {
                let elapsed = last.elapsed();
                (self.config.recovery_timeout.saturating_sub(elapsed)).as_secs_f64()
            }
            None => 0.0,
        }
    }

    fn on_success(&self, inner: &mut Inner) {
        inner.counters.total += 1;
        match inner.state {
            BreakerState::Closed => {
                inner.counters.failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.counters.successes += 1;
                if inner.counters.successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.counters = BreakerCounters::default();
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner) {
        inner.counters.total += 1;
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                inner.counters.failures += 1;
                if inner.counters.failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.counters.successes = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Execute `f`, counting failures for which `is_excluded` returns false.
    /// Excluded errors still propagate but do not move the state machine.
    pub fn call<F, T, E>(&self, is_excluded: impl Fn(&E) -> bool, f: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        {
            let mut inner = self.inner.lock();
            self.refresh(&mut inner);
            match inner.state {
                BreakerState::Open => {
                    inner.counters.rejected += 1;
                    let retry_after_secs = self.remaining_recovery_secs(&inner);
                    return CallOutcome::Rejected(CoreError::CircuitOpen {
                        breaker: self.name.clone(),
                        retry_after_secs,
                    });
                }
                BreakerState::HalfOpen => {
                    if inner.half_open_inflight >= self.config.half_open_max_calls {
                        inner.counters.rejected += 1;
                        return CallOutcome::Rejected(CoreError::CircuitOpen {
                            breaker: self.name.clone(),
                            retry_after_secs: 0.0,
                        });
                    }
                    inner.half_open_inflight += 1;
                }
                BreakerState::Closed => {}
            }
        }

        match f() {
            Ok(value) => {
                let mut inner = self.inner.lock();
                self.on_success(&mut inner);
                if inner.half_open_inflight > 0 {
                    inner.half_open_inflight -= 1;
                }
                CallOutcome::Ok(value)
            }
            Err(err) => {
                let mut inner = self.inner.lock();
                if inner.half_open_inflight > 0 {
                    inner.half_open_inflight -= 1;
                }
                if is_excluded(&err) {
                    self.on_success(&mut inner);
                } else {
                    self.on_failure(&mut inner);
                }
                CallOutcome::Failed(err)
            }
        }
    }

    /// Convenience wrapper for callers with no excluded-error classification.
    pub fn call_simple<F, T, E>(&self, f: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call(|_| false, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(failure_threshold: u32, recovery: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 1,
            recovery_timeout: recovery,
            half_open_max_calls: 1,
        }
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = CircuitBreaker::new("svc", cfg(3, Duration::from_millis(100)));
        for _ in 0..3 {
            let _: CallOutcome<(), &str> = cb.call_simple(|| Err("boom"));
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn recovers_through_half_open_to_closed() {
        let cb = CircuitBreaker::new("svc", cfg(1, Duration::from_millis(20)));
        let _: CallOutcome<(), &str> = cb.call_simple(|| Err("boom"));
        assert_eq!(cb.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        let out: CallOutcome<(), &str> = cb.call_simple(|| Ok(()));
        assert!(matches!(out, CallOutcome::Ok(())));
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.counters().failures, 0);
    }

    #[test]
    fn rejects_while_open() {
        let cb = CircuitBreaker::new("svc", cfg(1, Duration::from_secs(60)));
        let _: CallOutcome<(), &str> = cb.call_simple(|| Err("boom"));
        let out: CallOutcome<(), &str> = cb.call_simple(|| Ok(()));
        assert!(matches!(out, CallOutcome::Rejected(CoreError::CircuitOpen { .. })));
    }

    #[test]
    fn excluded_errors_do_not_count_as_failures() {
        let cb = CircuitBreaker::new("svc", cfg(1, Duration::from_secs(60)));
        let out: CallOutcome<(), &str> = cb.call(|_| true, || Err("ignored"));
        assert!(matches!(out, CallOutcome::Failed("ignored")));
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
