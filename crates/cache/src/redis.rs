//! Redis-backed cache shared by every process serving the same workspaces.

use async_trait::async_trait;
use chatvault_types::{Cache, traits::Result};
use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use std::time::Duration;

/// A [`Cache`] stored in Redis with `SET EX` expiry.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    /// Connects to Redis (e.g. `"redis://127.0.0.1:6379"`).
    ///
    /// Keys are stored under `prefix` so several deployments can share one
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Cache`](chatvault_types::VaultError::Cache) if the
    /// URL is invalid or the initial connection fails.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::debug!(url, "connected to redis cache");
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get::<_, Option<String>>(self.key(key)).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(key), value, expiry_secs(ttl))
            .await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists::<_, bool>(self.key(key)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_rounds_up() {
        assert_eq!(expiry_secs(Duration::ZERO), 1);
        assert_eq!(expiry_secs(Duration::from_millis(300)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let err = RedisCache::connect("not a url", "chatvault:")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, chatvault_types::VaultError::Cache(_)));
    }
}
