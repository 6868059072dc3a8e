use super::store::{Decrement, SharedStore, StoreError};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Record {
    value: i64,
    expires_at: Instant,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// In-process shared store for single-instance deployments and tests.
///
/// Each operation holds the key's shard lock for its whole duration, which
/// gives the same per-key atomicity as the Redis commands. Time comes from
/// `tokio::time`, so paused-clock tests can move windows forward.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "Purged expired rate limit records");
        }
        removed
    }

    /// Number of records currently held, expired or not
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn create_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let record = Record {
            value,
            expires_at: now + ttl,
        };

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(record);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(true)
            }
        }
    }

    async fn decrement_if_positive(
        &self,
        key: &str,
        capacity: i64,
        _window: Duration,
    ) -> Result<Decrement, StoreError> {
        let now = Instant::now();

        match self.records.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                entry.remove();
                Ok(Decrement::Missing)
            }
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let ttl = Some(record.ttl(now));
                record.value = record.value.min(capacity);
                if record.value <= 0 {
                    Ok(Decrement::Exhausted { ttl })
                } else {
                    record.value -= 1;
                    Ok(Decrement::Applied {
                        remaining: record.value,
                        ttl,
                    })
                }
            }
            Entry::Vacant(_) => Ok(Decrement::Missing),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = Instant::now();
        Ok(self
            .records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::store::contract;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_create_if_absent_only_once() {
        contract::create_if_absent_only_once(&MemoryStore::new(), "k").await;
    }

    #[tokio::test]
    async fn test_decrement_until_exhausted() {
        contract::decrement_until_exhausted(&MemoryStore::new(), "k").await;
    }

    #[tokio::test]
    async fn test_decrement_lowers_value_to_capacity() {
        contract::decrement_lowers_value_to_capacity(&MemoryStore::new(), "k").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrement_keeps_ttl() {
        let store = MemoryStore::new();
        store.create_if_absent("k", 5, WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;

        match store.decrement_if_positive("k", 10, WINDOW).await.unwrap() {
            Decrement::Applied { remaining, ttl } => {
                assert_eq!(remaining, 4);
                assert_eq!(ttl, Some(Duration::from_secs(40)));
            }
            other => panic!("expected decrement, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_replaced() {
        let store = MemoryStore::new();
        store.create_if_absent("k", 0, WINDOW).await.unwrap();

        tokio::time::advance(WINDOW).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(
            store.decrement_if_positive("k", 10, WINDOW).await.unwrap(),
            Decrement::Missing
        );
        assert!(store.create_if_absent("k", 7, WINDOW).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.create_if_absent("short", 1, Duration::from_secs(1)).await.unwrap();
        store.create_if_absent("long", 1, WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").await.unwrap(), Some(1));
    }
}
