//! Audit trail for credential events
//!
//! Events are written through [`AuditRepository`]. A failed write is logged
//! and never fails the operation being audited.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use warden_db::{AuditRepository, CreateAuditEvent};
use warden_types::{ClientInfo, UserId};

/// Audited credential action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Logout,
    RefreshToken,
    ForgotPassword,
    ResetPassword,
    ChangePassword,
    Enable2fa,
    Disable2fa,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::RefreshToken => "REFRESH_TOKEN",
            Self::ForgotPassword => "FORGOT_PASSWORD",
            Self::ResetPassword => "RESET_PASSWORD",
            Self::ChangePassword => "CHANGE_PASSWORD",
            Self::Enable2fa => "ENABLE_2FA",
            Self::Disable2fa => "DISABLE_2FA",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub service_name: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, user_id: Option<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            username: None,
            action,
            ip_address: None,
            user_agent: None,
            service_name: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Copy transport metadata from the request
    #[must_use]
    pub fn with_client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self.service_name = client.service_name.clone();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.details = serde_json::json!({ "description": description });
        self
    }
}

impl From<AuditEvent> for CreateAuditEvent {
    fn from(event: AuditEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.action.as_str().to_string(),
            user_id: event.user_id,
            username: event.username,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            service_name: event.service_name,
            details: event.details,
            performed_at: event.created_at,
        }
    }
}

/// Writes audit events, swallowing storage failures
pub struct AuditLogger<A: AuditRepository> {
    repo: Arc<A>,
}

impl<A: AuditRepository> Clone for AuditLogger<A> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<A: AuditRepository> AuditLogger<A> {
    pub fn new(repo: Arc<A>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, event: AuditEvent) {
        let action = event.action;
        let user_id = event.user_id;
        if let Err(e) = self.repo.create(event.into()).await {
            tracing::warn!(
                action = action.as_str(),
                user_id = ?user_id,
                error = %e,
                "Failed to write audit event"
            );
        }
    }
}
