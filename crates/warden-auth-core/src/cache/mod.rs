//! Ephemeral cache
//!
//! [`CacheBackend`] is the raw TTL key/value store. [`AuthCache`] lays the
//! auth keyspace over it:
//!
//! | Key | Value |
//! |-----|-------|
//! | `session:{id}` | owning user id |
//! | `blacklist:{jti}` | marker |
//! | `otp:{user_id}` | 6-digit reset OTP |
//! | `reset:{token}` | user id |
//! | `login_attempt:{identifier}` | failure count |
//! | `2fa_pending:{user_id}` | pending setup JSON |
//!
//! Every key carries the configured prefix and a TTL.

mod guarded;
mod memory;
mod redis;

pub use self::guarded::GuardedCache;
pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_types::{SessionId, UserId};

use crate::crypto::constant_time_str_eq;
use crate::observability::SharedMetrics;
use crate::AuthError;

/// TTL key/value store
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend label for logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError>;

    /// Atomically read and delete
    async fn take(&self, key: &str) -> Result<Option<String>, AuthError>;

    async fn delete(&self, key: &str) -> Result<(), AuthError>;

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Atomically increment a counter and reset its TTL; returns the new value
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), AuthError>;
}

/// Two-factor enrollment awaiting its first verified code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    pub secret: String,
    /// Plaintext; hashed only once the setup is verified
    pub recovery_codes: Vec<String>,
}

/// Keyspace facade over a [`CacheBackend`]
#[derive(Clone)]
pub struct AuthCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    metrics: SharedMetrics,
}

impl AuthCache {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>, metrics: SharedMetrics) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            metrics,
        }
    }

    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    fn key(&self, namespace: &str, id: impl std::fmt::Display) -> String {
        format!("{}{}:{}", self.prefix, namespace, id)
    }

    async fn lookup(&self, cache: &'static str, key: &str) -> Result<Option<String>, AuthError> {
        let value = self.backend.get(key).await?;
        self.metrics.record_cache_lookup(cache, value.is_some());
        Ok(value)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn cache_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        self.backend
            .set(&self.key("session", session_id), &user_id.to_string(), ttl)
            .await
    }

    /// Owning user of a cached session
    pub async fn cached_session(&self, session_id: SessionId) -> Result<Option<UserId>, AuthError> {
        Ok(self
            .lookup("session", &self.key("session", session_id))
            .await?
            .and_then(|v| UserId::parse(&v).ok()))
    }

    pub async fn drop_session(&self, session_id: SessionId) -> Result<(), AuthError> {
        self.backend.delete(&self.key("session", session_id)).await
    }

    // =========================================================================
    // Token blacklist
    // =========================================================================

    pub async fn blacklist(&self, jti: &str, ttl: Duration) -> Result<(), AuthError> {
        self.backend.set(&self.key("blacklist", jti), "1", ttl).await
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        let hit = self.backend.exists(&self.key("blacklist", jti)).await?;
        self.metrics.record_cache_lookup("blacklist", hit);
        Ok(hit)
    }

    // =========================================================================
    // Password reset
    // =========================================================================

    /// Store the reset OTP, replacing any earlier one
    pub async fn store_otp(&self, user_id: UserId, code: &str, ttl: Duration) -> Result<(), AuthError> {
        self.backend.set(&self.key("otp", user_id), code, ttl).await
    }

    /// Consume the stored OTP if `code` matches it.
    ///
    /// A wrong guess leaves the OTP in place. Of two concurrent correct
    /// guesses only one consumes it.
    pub async fn consume_otp(&self, user_id: UserId, code: &str) -> Result<bool, AuthError> {
        let key = self.key("otp", user_id);
        let Some(stored) = self.lookup("otp", &key).await? else {
            return Ok(false);
        };
        if !constant_time_str_eq(&stored, code) {
            return Ok(false);
        }
        Ok(self
            .backend
            .take(&key)
            .await?
            .is_some_and(|taken| constant_time_str_eq(&taken, code)))
    }

    pub async fn store_reset_token(
        &self,
        token: &str,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        self.backend
            .set(&self.key("reset", token), &user_id.to_string(), ttl)
            .await
    }

    /// Spend a reset token; `None` if unknown, expired or already spent
    pub async fn take_reset_token(&self, token: &str) -> Result<Option<UserId>, AuthError> {
        let value = self.backend.take(&self.key("reset", token)).await?;
        self.metrics.record_cache_lookup("reset", value.is_some());
        Ok(value.and_then(|v| UserId::parse(&v).ok()))
    }

    // =========================================================================
    // Login attempts
    // =========================================================================

    /// Count a failed attempt; the window restarts on every failure
    pub async fn record_failed_attempt(&self, identifier: &str, window: Duration) -> Result<i64, AuthError> {
        self.backend
            .increment(&self.key("login_attempt", identifier), window)
            .await
    }

    pub async fn failed_attempts(&self, identifier: &str) -> Result<i64, AuthError> {
        Ok(self
            .lookup("login_attempt", &self.key("login_attempt", identifier))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub async fn reset_attempts(&self, identifier: &str) -> Result<(), AuthError> {
        self.backend
            .delete(&self.key("login_attempt", identifier))
            .await
    }

    // =========================================================================
    // Pending two-factor setup
    // =========================================================================

    pub async fn store_pending_2fa(
        &self,
        user_id: UserId,
        pending: &PendingTwoFactor,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let json = serde_json::to_string(pending)
            .map_err(|e| AuthError::Internal(format!("serialize pending 2FA setup: {e}")))?;
        self.backend.set(&self.key("2fa_pending", user_id), &json, ttl).await
    }

    pub async fn pending_2fa(&self, user_id: UserId) -> Result<Option<PendingTwoFactor>, AuthError> {
        let Some(json) = self
            .lookup("2fa_pending", &self.key("2fa_pending", user_id))
            .await?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Discarding unreadable pending 2FA setup");
                Ok(None)
            }
        }
    }

    /// Remove the pending setup; true if this call removed it
    pub async fn take_pending_2fa(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self
            .backend
            .take(&self.key("2fa_pending", user_id))
            .await?
            .is_some())
    }
}

impl std::fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCache")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Backend whose every call fails, for outage tests
#[cfg(test)]
pub(crate) struct DownCache;

#[cfg(test)]
#[async_trait]
impl CacheBackend for DownCache {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn get(&self, _: &str) -> Result<Option<String>, AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }

    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }

    async fn take(&self, _: &str) -> Result<Option<String>, AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }

    async fn delete(&self, _: &str) -> Result<(), AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }

    async fn increment(&self, _: &str, _: Duration) -> Result<i64, AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Err(AuthError::Cache("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::NoopMetrics;

    fn cache() -> AuthCache {
        AuthCache::new(Arc::new(MemoryCache::default()), "iam:", Arc::new(NoopMetrics))
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let backend = Arc::new(MemoryCache::default());
        let cache = AuthCache::new(backend.clone(), "iam:", Arc::new(NoopMetrics));
        cache.blacklist("jti-1", Duration::from_secs(60)).await.unwrap();
        assert!(backend.exists("iam:blacklist:jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_otp_wrong_guess_keeps_code() {
        let cache = cache();
        let user = UserId::new();
        cache.store_otp(user, "123456", Duration::from_secs(300)).await.unwrap();
        assert!(!cache.consume_otp(user, "000000").await.unwrap());
        assert!(cache.consume_otp(user, "123456").await.unwrap());
        assert!(!cache.consume_otp(user, "123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_new_otp_replaces_old() {
        let cache = cache();
        let user = UserId::new();
        cache.store_otp(user, "111111", Duration::from_secs(300)).await.unwrap();
        cache.store_otp(user, "222222", Duration::from_secs(300)).await.unwrap();
        assert!(!cache.consume_otp(user, "111111").await.unwrap());
        assert!(cache.consume_otp(user, "222222").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_token_single_use() {
        let cache = cache();
        let user = UserId::new();
        cache.store_reset_token("tok", user, Duration::from_secs(600)).await.unwrap();
        assert_eq!(cache.take_reset_token("tok").await.unwrap(), Some(user));
        assert_eq!(cache.take_reset_token("tok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_attempt_counter() {
        let cache = cache();
        let window = Duration::from_secs(900);
        assert_eq!(cache.failed_attempts("bob").await.unwrap(), 0);
        cache.record_failed_attempt("bob", window).await.unwrap();
        assert_eq!(cache.record_failed_attempt("bob", window).await.unwrap(), 2);
        assert_eq!(cache.failed_attempts("bob").await.unwrap(), 2);
        cache.reset_attempts("bob").await.unwrap();
        assert_eq!(cache.failed_attempts("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_2fa_roundtrip() {
        let cache = cache();
        let user = UserId::new();
        let pending = PendingTwoFactor {
            secret: "JBSWY3DPEHPK3PXP".into(),
            recovery_codes: vec!["a1b2c3d4e5".into()],
        };
        cache
            .store_pending_2fa(user, &pending, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache.pending_2fa(user).await.unwrap(), Some(pending));
        assert!(cache.take_pending_2fa(user).await.unwrap());
        assert!(!cache.take_pending_2fa(user).await.unwrap());
        assert_eq!(cache.pending_2fa(user).await.unwrap(), None);
    }
}
