use super::store::{Decrement, SharedStore, StoreError};
use super::types::{ceil_secs, ClientId, RateLimitConfig, RateLimitResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single store round trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// A bucket can expire between the create attempt and the decrement. Each
/// retry starts a fresh create, so more than a couple of rounds means the
/// window is pathologically short.
const MAX_ATTEMPTS: usize = 3;

/// Fixed-window rate limiter backed by a [`SharedStore`].
///
/// Holds no counters itself. Every decision is made by one atomic store
/// operation, so any number of proxy tasks or processes sharing the store
/// admit at most `capacity` requests per client per window.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    config: RateLimitConfig,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one unit of `client`'s quota.
    ///
    /// Returns a denied result when the quota is spent and `Err` only when the
    /// store could not be consulted.
    pub async fn consume(&self, client: &ClientId) -> Result<RateLimitResult, StoreError> {
        let key = self.config.key_for(client);
        let capacity = self.config.capacity;
        let window = self.config.window();

        if capacity == 0 {
            return Ok(RateLimitResult::denied(0, self.config.window_secs));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let created = self
                .bounded(
                    self.store
                        .create_if_absent(&key, i64::from(capacity) - 1, window),
                )
                .await?;

            if created {
                debug!(client = %client, remaining = capacity - 1, "Created rate limit bucket");
                return Ok(RateLimitResult::allowed(
                    capacity - 1,
                    capacity,
                    self.config.window_secs,
                ));
            }

            match self
                .bounded(
                    self.store
                        .decrement_if_positive(&key, i64::from(capacity), window),
                )
                .await?
            {
                Decrement::Applied { remaining, ttl } => {
                    let remaining = clamp_remaining(remaining, capacity);
                    debug!(client = %client, remaining, "Rate limit check passed");
                    return Ok(RateLimitResult::allowed(
                        remaining,
                        capacity,
                        self.reset_after(ttl),
                    ));
                }
                Decrement::Exhausted { ttl } => {
                    debug!(client = %client, "Rate limit exhausted");
                    return Ok(RateLimitResult::denied(capacity, self.reset_after(ttl)));
                }
                Decrement::Missing => {
                    debug!(client = %client, attempt, "Bucket expired mid-consume, retrying");
                }
            }
        }

        warn!(key = %key, "Rate limit bucket kept expiring, giving up");
        Err(StoreError::Contention(key))
    }

    /// Remaining quota for `client` without consuming any.
    /// `None` when the client has no live bucket.
    pub async fn remaining(&self, client: &ClientId) -> Result<Option<u32>, StoreError> {
        let key = self.config.key_for(client);
        let value = self.bounded(self.store.get(&key)).await?;
        Ok(value.map(|v| clamp_remaining(v, self.config.capacity)))
    }

    /// Check that the store answers
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.store.ping()).await
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    fn reset_after(&self, ttl: Option<Duration>) -> u64 {
        ttl.map(ceil_secs).unwrap_or(self.config.window_secs)
    }
}

fn clamp_remaining(value: i64, capacity: u32) -> u32 {
    value.clamp(0, i64::from(capacity)) as u32
}
