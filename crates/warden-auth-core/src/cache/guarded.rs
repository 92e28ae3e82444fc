//! Breaker-guarded cache backend

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::CacheBackend;
use crate::breaker::CircuitBreaker;
use crate::AuthError;

/// Routes every call through a circuit breaker.
///
/// While the breaker is open calls fail fast with [`AuthError::Cache`],
/// which callers handle exactly like a backend outage.
pub struct GuardedCache<B> {
    inner: B,
    breaker: Arc<CircuitBreaker>,
}

impl<B: CacheBackend> GuardedCache<B> {
    pub fn new(inner: B, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for GuardedCache<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.breaker.call(|| self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        self.breaker.call(|| self.inner.set(key, value, ttl)).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.breaker.call(|| self.inner.take(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.breaker.call(|| self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        self.breaker.call(|| self.inner.exists(key)).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        self.breaker.call(|| self.inner.increment(key, ttl)).await
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.breaker.call(|| self.inner.ping()).await
    }
}
