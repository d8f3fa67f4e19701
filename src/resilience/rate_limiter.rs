//! Token-bucket rate limiter and a thread-safe per-key registry.
//! See spec §4.3.

use super::config::RateLimiterConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    max_tokens: f64,
    rate_per_second: f64,
    last_refill: Instant,
    total_allowed: u64,
    total_rejected: u64,
}

impl Bucket {
    fn new(config: &RateLimiterConfig) -> Self {
        Self {
            tokens: config.max_tokens,
            max_tokens: config.max_tokens,
            rate_per_second: config.rate_per_second,
            last_refill: Instant::now(),
            total_allowed: 0,
            total_rejected: 0,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_second).min(self.max_tokens);
        self.last_refill = now;
    }

    fn consume(&mut self, n: f64) -> bool {
        self.refill();
        if self.tokens >= n {
            self.tokens -= n;
            self.total_allowed += 1;
            true
        } else {
            self.total_rejected += 1;
            false
        }
    }

    fn retry_after(&mut self) -> f64 {
        self.refill();
        if self.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - self.tokens) / self.rate_per_second
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    pub tokens: f64,
    pub max_tokens: f64,
    pub total_allowed: u64,
    pub total_rejected: u64,
}

/// A single token bucket. Safe for concurrent use; all reads/writes take
/// the bucket's own lock.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            inner: Mutex::new(Bucket::new(&config)),
        }
    }

    pub fn consume(&self, n: f64) -> bool {
        self.inner.lock().consume(n)
    }

    pub fn retry_after(&self) -> f64 {
        self.inner.lock().retry_after()
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut bucket = self.inner.lock();
        bucket.refill();
        RateLimiterStats {
            tokens: bucket.tokens,
            max_tokens: bucket.max_tokens,
            total_allowed: bucket.total_allowed,
            total_rejected: bucket.total_rejected,
        }
    }
}

/// Maps an opaque key (client IP, workspace id, ...) to an independent
/// bucket. All buckets created through a single registry share the
/// registry's default config unless overridden at creation.
pub struct RateLimiterRegistry<K> {
    default_config: RateLimiterConfig,
    buckets: Mutex<HashMap<K, std::sync::Arc<RateLimiter>>>,
}

impl<K: Eq + Hash + Clone> RateLimiterRegistry<K> {
    pub fn new(default_config: RateLimiterConfig) -> Self {
        Self {
            default_config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent: the first call for `key` creates the bucket (using
    /// `config` if given, else the registry default); later calls return
    /// the existing bucket and ignore `config`.
    pub fn get_or_create(&self, key: K, config: Option<RateLimiterConfig>) -> std::sync::Arc<RateLimiter> {
        let mut buckets = self.buckets.lock();
        buckets
            .entry(key)
            .or_insert_with(|| {
                std::sync::Arc::new(RateLimiter::new(config.unwrap_or_else(|| self.default_config.clone())))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn consume_respects_capacity() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_tokens: 3.0,
            rate_per_second: 0.0,
        });
        assert!(limiter.consume(1.0));
        assert!(limiter.consume(1.0));
        assert!(limiter.consume(1.0));
        assert!(!limiter.consume(1.0));
    }

    #[test]
    fn tokens_never_exceed_max() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_tokens: 5.0,
            rate_per_second: 1000.0,
        });
        std::thread::sleep(Duration::from_millis(50));
        let stats = limiter.stats();
        assert!(stats.tokens <= stats.max_tokens);
    }

    #[test]
    fn retry_after_is_zero_when_tokens_available() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_tokens: 3.0,
            rate_per_second: 1.0,
        });
        assert_eq!(limiter.retry_after(), 0.0);
    }

    #[test]
    fn registry_get_or_create_is_idempotent() {
        let registry: RateLimiterRegistry<String> = RateLimiterRegistry::new(RateLimiterConfig::default());
        let a = registry.get_or_create("ws_a".to_string(), None);
        let b = registry.get_or_create("ws_a".to_string(), Some(RateLimiterConfig { max_tokens: 1.0, rate_per_second: 1.0 }));
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }
}
