use super::lua_scripts::DECREMENT_IF_POSITIVE_SCRIPT;
use super::store::{Decrement, SharedStore, StoreError};
use crate::config::StoreConfig;
use crate::secrets::{resolve_secret_ref, ExposeSecret};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, IntoConnectionInfo, Script};
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed shared store
///
/// `ConnectionManager` is multiplexed and reconnects on its own, so clones of
/// this store share one connection and need no lock.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    decrement: Script,
}

impl RedisStore {
    /// Connect using the store section of the configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut info = config.url.as_str().into_connection_info()?;
        info.redis.db = config.database;
        if let Some(password) = &config.password {
            let secret = resolve_secret_ref(password)
                .map_err(|e| StoreError::Unavailable(format!("store password: {}", e)))?;
            info.redis.password = Some(secret.expose_secret().clone());
        }

        debug!(addr = ?info.addr, db = info.redis.db, "Connecting to Redis");

        let client = redis::Client::open(info)?;
        let connection = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(CONNECT_TIMEOUT))??;

        info!("Connected to Redis");

        Ok(Self {
            connection,
            decrement: Script::new(DECREMENT_IF_POSITIVE_SCRIPT),
        })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn create_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut connection)
            .await?;
        Ok(reply.is_some())
    }

    async fn decrement_if_positive(
        &self,
        key: &str,
        capacity: i64,
        window: Duration,
    ) -> Result<Decrement, StoreError> {
        let mut connection = self.connection.clone();
        let result = self
            .decrement
            .key(key)
            .arg(window.as_millis() as u64)
            .arg(capacity)
            .invoke_async::<_, Vec<i64>>(&mut connection)
            .await?;

        let (status, remaining, ttl_ms) = match result.as_slice() {
            [status, remaining, ttl_ms] => (*status, *remaining, *ttl_ms),
            other => {
                return Err(StoreError::Unavailable(format!(
                    "unexpected script reply: {:?}",
                    other
                )))
            }
        };
        let ttl = u64::try_from(ttl_ms).ok().map(Duration::from_millis);

        Ok(match status {
            1 => Decrement::Applied { remaining, ttl },
            0 => Decrement::Exhausted { ttl },
            _ => Decrement::Missing,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut connection = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<i64>>(&mut connection)
            .await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }
}
