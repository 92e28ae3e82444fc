//! Login attempt limiter
//!
//! Counts failed logins per identifier in the ephemeral cache. The counter
//! window restarts on every failure. The limiter is best-effort: when the
//! cache is unreachable a login proceeds without the lockout check, and the
//! durable per-user counter still applies.

use std::time::Duration;

use crate::cache::AuthCache;
use crate::AuthError;

/// Per-identifier failed-login counter
#[derive(Debug, Clone)]
pub struct LoginRateLimiter {
    cache: AuthCache,
    max_attempts: u32,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(cache: AuthCache, max_attempts: u32, window: Duration) -> Self {
        Self {
            cache,
            max_attempts,
            window,
        }
    }

    /// Reject with `AccountLocked` once the identifier used up its attempts
    pub async fn check(&self, identifier: &str) -> Result<(), AuthError> {
        match self.cache.failed_attempts(identifier).await {
            Ok(attempts) if attempts >= i64::from(self.max_attempts) => {
                tracing::warn!(identifier, attempts, "Login attempts exhausted");
                Err(AuthError::AccountLocked)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(identifier, error = %e, "Rate limit check unavailable, allowing login");
                Ok(())
            }
        }
    }

    /// Count a failed attempt; returns the new total when the cache answered
    pub async fn record_failure(&self, identifier: &str) -> Option<i64> {
        match self.cache.record_failed_attempt(identifier, self.window).await {
            Ok(attempts) => Some(attempts),
            Err(e) => {
                tracing::warn!(identifier, error = %e, "Failed to record login attempt");
                None
            }
        }
    }

    /// Clear the counter after a successful login
    pub async fn reset(&self, identifier: &str) {
        if let Err(e) = self.cache.reset_attempts(identifier).await {
            tracing::warn!(identifier, error = %e, "Failed to reset login attempts");
        }
    }
}
