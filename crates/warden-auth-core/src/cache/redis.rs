//! Redis cache backend

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::CacheBackend;
use crate::AuthError;

/// Shared cache backend on Redis.
///
/// `take` uses GETDEL, so Redis 6.2 or newer is required.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AuthError::Configuration(format!("invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error)?;

        tracing::debug!("Redis cache connected");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn redis_error(err: redis::RedisError) -> AuthError {
    AuthError::Cache(err.to_string())
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut conn = self.conn.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(redis_error)
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(redis_error)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        let mut conn = self.conn.clone();
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(redis_error)
    }
}
