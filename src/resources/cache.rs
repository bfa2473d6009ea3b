//! Cache server: a redis client handing out multiplexed connections.

use crate::config::CacheOptions;
use crate::error::{ResourceKind, Result, ServiceError};
use redis::IntoConnectionInfo;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::time::timeout;

const KIND: ResourceKind = ResourceKind::Cache;

/// Connection source for the cache server.
///
/// Creating a pool never dials; every [`CachePool::get`] opens a connection
/// that authenticates with the configured password.
#[derive(Clone)]
pub struct CachePool {
    client: redis::Client,
    connect_timeout: Duration,
}

impl CachePool {
    /// Build a pool for `address` (`host:port`). An empty password skips AUTH.
    pub fn new(address: &str, password: &str, connect_timeout: Duration) -> Result<Self> {
        let mut info = format!("redis://{address}")
            .into_connection_info()
            .map_err(|e| ServiceError::setup(KIND, e))?;
        if !password.is_empty() {
            info.redis.password = Some(password.to_string());
        }
        let client = redis::Client::open(info).map_err(|e| ServiceError::setup(KIND, e))?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }

    /// Wrap an existing client, e.g. one pointing at a test server.
    pub fn from_client(client: redis::Client) -> Self {
        Self {
            client,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Open a connection to the server.
    pub async fn get(&self) -> Result<MultiplexedConnection> {
        timeout(
            self.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| {
            ServiceError::setup(
                KIND,
                format!("connect timed out after {:?}", self.connect_timeout),
            )
        })?
        .map_err(|e| ServiceError::setup(KIND, e))
    }

    /// Liveness check: a `PING` round-trip on a fresh connection.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::setup(KIND, e))?;
        tracing::debug!("Cache server answered {}", reply);
        Ok(())
    }
}

/// Adopt the injected pool, or build one and check it answers.
pub(crate) async fn open(options: &CacheOptions) -> Result<CachePool> {
    if let Some(pool) = options.injected_pool() {
        tracing::debug!("Using injected cache pool");
        return Ok(pool.clone());
    }

    let pool = CachePool::new(&options.address, &options.password, options.connect_timeout)?;
    pool.ping().await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Condition;

    #[test]
    fn test_password_is_attached_to_connection_info() {
        let pool = CachePool::new("cache.internal:6380", "hunter2", Duration::from_secs(1)).unwrap();
        let info = pool.client().get_connection_info();
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));

        let pool = CachePool::new("cache.internal:6380", "", Duration::from_secs(1)).unwrap();
        assert!(pool.client().get_connection_info().redis.password.is_none());
    }

    #[tokio::test]
    async fn test_injected_pool_skips_ping() {
        let injected = CachePool::from_client(redis::Client::open("redis://127.0.0.1:1/").unwrap());
        let options = CacheOptions::new("127.0.0.1:1", "secret").with_injected_pool(injected);
        assert!(open(&options).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_setup() {
        let options =
            CacheOptions::new("127.0.0.1:1", "secret").connect_timeout(Duration::from_secs(1));
        let err = open(&options).await.err().unwrap();
        assert!(err.is(ResourceKind::Cache, Condition::SetupFailed));
    }
}
