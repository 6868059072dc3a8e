//! Shared store abstraction for per-client counters.
//!
//! Every method is a single atomic operation from the point of view of
//! concurrent callers. The limiter composes them without ever splitting a
//! read-modify-write across two round trips.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the shared store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("bucket for key '{0}' kept expiring during consume")]
    Contention(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of [`SharedStore::decrement_if_positive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The counter was positive and has been decremented. TTL untouched.
    Applied {
        remaining: i64,
        ttl: Option<Duration>,
    },
    /// The counter is at zero. Nothing was written.
    Exhausted { ttl: Option<Duration> },
    /// No live record for the key.
    Missing,
}

/// Key-value store holding rate limit counters
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl` only if the key does not exist.
    /// Returns `true` when the record was created.
    async fn create_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Decrement `key` if its value is positive, preserving its TTL.
    ///
    /// A value above `capacity` is lowered to `capacity` before the decrement,
    /// so a record written under a larger quota never admits more than the
    /// current one. `window` is only used to give an expiry back to a record
    /// that somehow has none, so it cannot live forever.
    async fn decrement_if_positive(
        &self,
        key: &str,
        capacity: i64,
        window: Duration,
    ) -> Result<Decrement, StoreError>;

    /// Plain read of the current value
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Behaviour every [`SharedStore`] must show. Each store's tests run these
/// against their own implementation.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    pub async fn create_if_absent_only_once(store: &dyn SharedStore, key: &str) {
        assert!(store.create_if_absent(key, 9, WINDOW).await.unwrap());
        assert!(!store.create_if_absent(key, 4, WINDOW).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), Some(9));
    }

    pub async fn decrement_until_exhausted(store: &dyn SharedStore, key: &str) {
        assert_eq!(
            store.decrement_if_positive(key, 3, WINDOW).await.unwrap(),
            Decrement::Missing
        );

        store.create_if_absent(key, 2, WINDOW).await.unwrap();

        for expected in [1, 0] {
            match store.decrement_if_positive(key, 3, WINDOW).await.unwrap() {
                Decrement::Applied { remaining, ttl } => {
                    assert_eq!(remaining, expected);
                    assert!(ttl.unwrap() <= WINDOW);
                }
                other => panic!("expected decrement, got {:?}", other),
            }
        }

        // exhausted is sticky and writes nothing
        for _ in 0..3 {
            assert!(matches!(
                store.decrement_if_positive(key, 3, WINDOW).await.unwrap(),
                Decrement::Exhausted { .. }
            ));
        }
        assert_eq!(store.get(key).await.unwrap(), Some(0));
    }

    pub async fn decrement_lowers_value_to_capacity(store: &dyn SharedStore, key: &str) {
        // record left behind by an instance running with a larger quota
        store.create_if_absent(key, 50, WINDOW).await.unwrap();

        let mut applied = 0;
        while let Decrement::Applied { remaining, .. } =
            store.decrement_if_positive(key, 3, WINDOW).await.unwrap()
        {
            applied += 1;
            assert_eq!(remaining, 3 - applied);
        }

        assert_eq!(applied, 3);
        assert_eq!(store.get(key).await.unwrap(), Some(0));
    }
}
