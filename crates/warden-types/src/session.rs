//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One issued refresh-token lineage.
///
/// The id is stable across refreshes; `refresh_token_hash` and
/// `expires_at` are rotated on every successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// SHA-256 hex of the refresh token's jti
    pub refresh_token_hash: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub service_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session that expires at `expires_at`
    pub fn new(
        user_id: UserId,
        refresh_token_hash: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            refresh_token_hash: refresh_token_hash.into(),
            device_info: None,
            ip_address: None,
            service_name: None,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
        }
    }

    /// Set device info
    #[must_use]
    pub fn with_device_info(mut self, device_info: Option<String>) -> Self {
        self.device_info = device_info;
        self
    }

    /// Set originating IP address
    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    /// Set the calling service name
    #[must_use]
    pub fn with_service_name(mut self, service_name: Option<String>) -> Self {
        self.service_name = service_name;
        self
    }

    /// Check if the session is expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the session has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Check if the session is neither revoked nor expired
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }

    /// Mark the session revoked; revoking twice keeps the first timestamp
    pub fn revoke(&mut self) {
        if self.revoked_at.is_none() {
            self.revoked_at = Some(Utc::now());
        }
    }

    /// Point the session at a new refresh token
    pub fn rotate(&mut self, refresh_token_hash: impl Into<String>, expires_at: DateTime<Utc>) {
        self.refresh_token_hash = refresh_token_hash.into();
        self.expires_at = expires_at;
    }
}

/// Active session joined with the owning user, for admin listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub service_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Sortable columns for session listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSortField {
    #[default]
    CreatedAt,
    ExpiresAt,
    Username,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filters and paging for active session listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSessionsParams {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    /// Matches username or email, case-insensitive
    pub search: Option<String>,
    pub service_name: Option<String>,
    pub user_id: Option<UserId>,
    pub sort_by: SessionSortField,
    pub sort_order: SortOrder,
}

impl ListSessionsParams {
    /// Largest page size a caller may request
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Page clamped to >= 1
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn limit(&self) -> u32 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// Row offset for the current page
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

impl Default for ListSessionsParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            service_name: None,
            user_id: None,
            sort_by: SessionSortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_lifecycle() {
        let mut s = Session::new(UserId::new(), "hash", Utc::now() + Duration::days(7));
        assert!(s.is_active());
        s.revoke();
        let first = s.revoked_at;
        s.revoke();
        assert_eq!(s.revoked_at, first);
        assert!(!s.is_active());
    }

    #[test]
    fn test_rotation_keeps_identity() {
        let mut s = Session::new(UserId::new(), "old", Utc::now() + Duration::days(1));
        let id = s.id;
        let later = Utc::now() + Duration::days(7);
        s.rotate("new", later);
        assert_eq!(s.id, id);
        assert_eq!(s.refresh_token_hash, "new");
        assert_eq!(s.expires_at, later);
    }

    #[test]
    fn test_expired_session_inactive() {
        let s = Session::new(UserId::new(), "h", Utc::now() - Duration::seconds(1));
        assert!(s.is_expired());
        assert!(!s.is_active());
    }

    #[test]
    fn test_list_params_paging() {
        let params = ListSessionsParams {
            page: 0,
            page_size: 500,
            ..Default::default()
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), ListSessionsParams::MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 0);

        let params = ListSessionsParams {
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        assert_eq!(params.offset(), 20);
    }
}
