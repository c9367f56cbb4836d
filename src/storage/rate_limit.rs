//! Rate limiting whose state lives in the shared store.
//!
//! Invocations are short-lived and may overlap, so the last-call timestamp
//! cannot be held in process memory. The read-then-write is not atomic;
//! two invocations racing may both proceed, which only loosens the spacing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::kv::KvStore;
use crate::error::StoreError;

pub struct SharedRateLimiter {
    store: Arc<dyn KvStore>,
    key: String,
    min_interval: Duration,
}

impl SharedRateLimiter {
    /// Creates a limiter that spaces calls at least `min_interval` apart.
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            min_interval,
        }
    }

    /// Waits until the interval since the last recorded call has elapsed,
    /// then records this call.
    pub async fn acquire(&self) -> Result<(), StoreError> {
        if self.min_interval.is_zero() {
            return Ok(());
        }

        let last_ms = self
            .store
            .get(&self.key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());

        if let Some(last_ms) = last_ms {
            let elapsed_ms = Utc::now().timestamp_millis().saturating_sub(last_ms).max(0) as u128;
            let min_ms = self.min_interval.as_millis();
            if elapsed_ms < min_ms {
                let wait = Duration::from_millis((min_ms - elapsed_ms) as u64);
                debug!(key = %self.key, wait_ms = wait.as_millis() as u64, "Rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }

        self.store
            .set(&self.key, &Utc::now().timestamp_millis().to_string())
            .await
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_zero_interval_never_touches_store() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SharedRateLimiter::new(store.clone(), "rl:gen", Duration::ZERO);
        limiter.acquire().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_acquire_records_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SharedRateLimiter::new(store.clone(), "rl:gen", Duration::from_millis(5));
        limiter.acquire().await.unwrap();
        let raw = store.get("rl:gen").await.unwrap().expect("timestamp written");
        assert!(raw.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_second_acquire_waits_for_interval() {
        let store = Arc::new(MemoryStore::new());
        let limiter = SharedRateLimiter::new(store.clone(), "rl:gen", Duration::from_millis(50));
        limiter.acquire().await.unwrap();

        let started = std::time::Instant::now();
        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
