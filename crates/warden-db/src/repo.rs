//! Repository traits
//!
//! Define async repository interfaces for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use warden_types::{ListSessionsParams, Session, SessionId, SessionInfo, User, UserId};

use crate::error::DbResult;

/// Role codes and permission codes granted to a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolesAndPermissions {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by ID
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<User>>;

    /// Find a user by username
    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>>;

    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;

    /// Persist credential state. Returns `NotFound` if the user is gone.
    async fn update(&self, user: &User) -> DbResult<()>;

    /// Role codes plus effective permission codes (direct and via roles)
    async fn find_roles_and_permissions(&self, id: UserId) -> DbResult<RolesAndPermissions>;

    /// Replace all recovery codes for a user with the given SHA-256 hashes
    async fn store_recovery_codes(&self, id: UserId, code_hashes: &[String]) -> DbResult<()>;

    /// Mark an unused recovery code as used. Returns false if none matched.
    async fn use_recovery_code(&self, id: UserId, code_hash: &str) -> DbResult<bool>;

    /// Delete all recovery codes for a user
    async fn delete_recovery_codes(&self, id: UserId) -> DbResult<()>;
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session, revoking every other active session of the same
    /// user in the same transaction.
    async fn create(&self, session: &Session) -> DbResult<()>;

    /// Find a session by ID
    async fn find_by_id(&self, id: SessionId) -> DbResult<Option<Session>>;

    /// Find a session by refresh-token hash, revoked or not
    async fn find_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Session>>;

    /// Newest active session for a user
    async fn find_active_by_user(&self, user_id: UserId) -> DbResult<Option<Session>>;

    /// Rotate a session to a new token hash and expiry, but only if it is
    /// still active and still holds `expected_hash`. Returns false when
    /// another caller rotated or revoked it first.
    async fn rotate(
        &self,
        id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Revoke a session by ID. Returns `NotFound` if no such session.
    async fn revoke(&self, id: SessionId) -> DbResult<()>;

    /// Revoke the session holding `token_hash`. Returns `NotFound` if none.
    async fn revoke_by_token_hash(&self, token_hash: &str) -> DbResult<()>;

    /// Revoke all active sessions for a user
    async fn revoke_all_for_user(&self, user_id: UserId) -> DbResult<u64>;

    /// Page through active sessions joined with their users
    async fn list_active(&self, params: &ListSessionsParams) -> DbResult<(Vec<SessionInfo>, u64)>;

    /// Delete expired sessions
    async fn cleanup_expired(&self) -> DbResult<u64>;
}

/// Audit event input
#[derive(Debug, Clone)]
pub struct CreateAuditEvent {
    pub id: Uuid,
    /// Action name, e.g. `LOGIN`
    pub event_type: String,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub service_name: Option<String>,
    pub details: serde_json::Value,
    pub performed_at: DateTime<Utc>,
}

/// Audit repository trait
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an audit event
    async fn create(&self, event: CreateAuditEvent) -> DbResult<()>;
}
