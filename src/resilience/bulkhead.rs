//! Bounded concurrency pool with acquisition timeout. See spec §4.4.
//!
//! Async-only: per the open question in spec §9, a bulkhead picks one
//! concurrency regime at construction. Sync callers should run the guarded
//! work inside `tokio::task::block_in_place` or not use this type.

use super::config::BulkheadConfig;
use crate::error::CoreError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy)]
pub struct BulkheadStats {
    pub active_count: usize,
    pub available_slots: usize,
    pub total_accepted: u64,
    pub total_rejected: u64,
}

pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    total_accepted: AtomicU64,
    total_rejected: AtomicU64,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            name: name.into(),
            config,
            semaphore,
            total_accepted: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn active_count(&self) -> usize {
        self.config.max_concurrent - self.semaphore.available_permits()
    }

    pub fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            active_count: self.active_count(),
            available_slots: self.semaphore.available_permits(),
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }

    /// Acquires a slot (waiting at most `config.timeout`), runs `f`, and
    /// releases the slot on every exit path including a panic unwind
    /// (the permit is dropped with the guard regardless).
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let permit = tokio::time::timeout(self.config.timeout, self.semaphore.acquire()).await;
        let _permit = match permit {
            Ok(Ok(permit)) => permit,
            _ => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(CoreError::BulkheadFull {
                    name: self.name.clone(),
                });
            }
        };
        self.total_accepted.fetch_add(1, Ordering::Relaxed);
        Ok(f().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_up_to_max_concurrent() {
        let bulkhead = Bulkhead::new(
            "db",
            BulkheadConfig {
                max_concurrent: 2,
                timeout: Duration::from_millis(50),
            },
        );
        let result = bulkhead.execute(|| async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(bulkhead.stats().total_accepted, 1);
    }

    #[tokio::test]
    async fn rejects_when_full_past_timeout() {
        let bulkhead = Arc::new(Bulkhead::new(
            "db",
            BulkheadConfig {
                max_concurrent: 1,
                timeout: Duration::from_millis(20),
            },
        ));
        let holder = bulkhead.clone();
        let handle = tokio::spawn(async move {
            holder
                .execute(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = bulkhead.execute(|| async { () }).await;
        assert!(matches!(result, Err(CoreError::BulkheadFull { .. })));
        let _ = handle.await;
    }
}
