//! Session store
//!
//! One session row per refresh-token lineage, keyed by the SHA-256 of the
//! refresh token's jti. Creating a session revokes every other active
//! session of the same user in one transaction, so at most one session per
//! user is ever active.
//!
//! Persistence is fail-closed. The cache copy (`session:{id}`) is a lookup
//! accelerator only, written and dropped on a best-effort basis.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use warden_db::{DbError, SessionRepository};
use warden_types::{ClientInfo, ListSessionsParams, Session, SessionId, SessionInfo, UserId};

use crate::cache::AuthCache;
use crate::crypto::hash_token;
use crate::AuthError;

/// Outcome of a rotation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotated,
    /// Another caller rotated or revoked the session first
    Lost,
}

/// Session manager over the durable store and the cache
pub struct SessionManager<R: SessionRepository> {
    repo: Arc<R>,
    cache: AuthCache,
}

impl<R: SessionRepository> Clone for SessionManager<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            cache: self.cache.clone(),
        }
    }
}

impl<R: SessionRepository> SessionManager<R> {
    pub fn new(repo: Arc<R>, cache: AuthCache) -> Self {
        Self { repo, cache }
    }

    /// Persist a new session for `refresh_jti`, revoking the user's others
    pub async fn create(
        &self,
        user_id: UserId,
        refresh_jti: &str,
        expires_at: DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<Session, AuthError> {
        let session = Session::new(user_id, hash_token(refresh_jti), expires_at)
            .with_device_info(client.user_agent.clone())
            .with_ip_address(client.ip_address.clone())
            .with_service_name(client.service_name.clone());

        self.repo.create(&session).await.map_err(|e| {
            tracing::error!(%user_id, error = %e, "Failed to persist session");
            AuthError::from(e)
        })?;

        self.cache_best_effort(&session).await;
        tracing::debug!(%user_id, session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Session holding the refresh token with `refresh_jti`, revoked or not
    pub async fn find_by_refresh_jti(&self, refresh_jti: &str) -> Result<Option<Session>, AuthError> {
        Ok(self.repo.find_by_token_hash(&hash_token(refresh_jti)).await?)
    }

    /// Move `session` onto a new refresh token.
    ///
    /// Only succeeds if the row still holds the hash `session` was loaded
    /// with, so two refreshes racing on the same token cannot both win.
    pub async fn rotate(
        &self,
        session: &Session,
        new_refresh_jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Rotation, AuthError> {
        let rotated = self
            .repo
            .rotate(
                session.id,
                &session.refresh_token_hash,
                &hash_token(new_refresh_jti),
                expires_at,
            )
            .await?;

        if !rotated {
            tracing::warn!(session_id = %session.id, "Session rotation lost to a concurrent refresh");
            return Ok(Rotation::Lost);
        }

        let mut updated = session.clone();
        updated.rotate(hash_token(new_refresh_jti), expires_at);
        self.cache_best_effort(&updated).await;
        Ok(Rotation::Rotated)
    }

    /// Revoke the session holding the refresh token with `refresh_jti`
    pub async fn revoke_by_refresh_jti(&self, refresh_jti: &str) -> Result<(), AuthError> {
        match self.repo.revoke_by_token_hash(&hash_token(refresh_jti)).await {
            Ok(()) => Ok(()),
            Err(DbError::NotFound) => Err(AuthError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Revoke one session and drop its cache entry
    pub async fn revoke(&self, session_id: SessionId) -> Result<(), AuthError> {
        match self.repo.revoke(session_id).await {
            Ok(()) => {}
            Err(DbError::NotFound) => return Err(AuthError::SessionNotFound),
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = self.cache.drop_session(session_id).await {
            tracing::warn!(%session_id, error = %e, "Failed to drop cached session");
        }
        tracing::info!(%session_id, "Session revoked");
        Ok(())
    }

    /// Revoke every active session of a user
    pub async fn revoke_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let count = self.repo.revoke_all_for_user(user_id).await?;
        tracing::info!(%user_id, count, "Revoked all sessions");
        Ok(count)
    }

    /// Newest active session of a user
    pub async fn current(&self, user_id: UserId) -> Result<Session, AuthError> {
        self.repo
            .find_active_by_user(user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// Page through active sessions
    pub async fn list_active(
        &self,
        params: &ListSessionsParams,
    ) -> Result<(Vec<SessionInfo>, u64), AuthError> {
        Ok(self.repo.list_active(params).await?)
    }

    /// Delete expired rows
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        let removed = self.repo.cleanup_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    async fn cache_best_effort(&self, session: &Session) {
        let ttl = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        if let Err(e) = self.cache.cache_session(session.id, session.user_id, ttl).await {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to cache session");
        }
    }
}

impl<R: SessionRepository> std::fmt::Debug for SessionManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
