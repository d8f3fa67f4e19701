//! Bounded retry with exponential/linear/constant backoff and jitter.
//! See spec §4.2.

use super::config::{BackoffStrategy, RetryConfig};
use crate::error::CoreError;
use rand::Rng;
use std::time::Duration;

fn base_delay(strategy: BackoffStrategy, base: Duration, attempt: u32) -> Duration {
    match strategy {
        BackoffStrategy::Exponential => base.saturating_mul(1u32 << attempt.min(31)),
        BackoffStrategy::Linear => base.saturating_mul(attempt + 1),
        BackoffStrategy::Constant => base,
    }
}

/// Delay before the `attempt`-th retry (0-based), including jitter, capped
/// at `max_delay`.
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let base = base_delay(config.strategy, config.base_delay, attempt);
    let jitter = if config.jitter_max.is_zero() {
        Duration::ZERO
    } else {
        let max_nanos = config.jitter_max.as_nanos().min(u128::from(u64::MAX)) as u64;
        Duration::from_nanos(rand::thread_rng().gen_range(0..=max_nanos))
    };
    (base + jitter).min(config.max_delay)
}

/// Runs `f`, retrying up to `config.max_attempts` total attempts while
/// `is_retryable` returns true for the error. Sleeps synchronously between
/// attempts.
pub fn retry_sync<F, T, E>(config: &RetryConfig, is_retryable: impl Fn(&E) -> bool, mut f: F) -> Result<T, CoreError>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !is_retryable(&err) {
                    return Err(CoreError::MaxRetriesExceeded {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                std::thread::sleep(delay_for_attempt(config, attempt - 1));
            }
        }
    }
}

/// Async twin of [`retry_sync`]: identical semantics, cooperative sleep at
/// suspension points so other tasks can progress while waiting.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !is_retryable(&err) {
                    return Err(CoreError::MaxRetriesExceeded {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                tokio::time::sleep(delay_for_attempt(config, attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_with_no_jitter_matches_formula() {
        let config = RetryConfig {
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_max: Duration::ZERO,
        };
        assert_eq!(delay_for_attempt(&config, 0), Duration::from_millis(100));
        assert_eq!(delay_for_attempt(&config, 1), Duration::from_millis(200));
        assert_eq!(delay_for_attempt(&config, 2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 10,
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter_max: Duration::ZERO,
        };
        assert_eq!(delay_for_attempt(&config, 5), Duration::from_millis(300));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            strategy: BackoffStrategy::Constant,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_max: Duration::ZERO,
        };
        let mut calls = 0;
        let result: Result<(), CoreError> = retry_sync(&config, |_: &&str| true, || {
            calls += 1;
            Err("nope")
        });
        assert!(matches!(result, Err(CoreError::MaxRetriesExceeded { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let config = RetryConfig::default();
        let mut calls = 0;
        let result: Result<(), CoreError> = retry_sync(&config, |_: &&str| false, || {
            calls += 1;
            Err("fatal")
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
