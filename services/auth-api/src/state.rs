//! Application state

use std::ops::Deref;
use std::sync::Arc;

use warden_auth_core::{AuthService, AuthorizationGate};
use warden_db::pg::{PgAuditRepository, PgSessionRepository, PgUserRepository};
use warden_db::DbPool;

use crate::config::Config;

/// Type alias for the auth service with concrete repository types
pub type AuthServiceImpl = AuthService<PgUserRepository, PgSessionRepository, PgAuditRepository>;

/// Shared database pool wrapper for health checks
#[derive(Clone)]
pub struct SharedPool(Arc<DbPool>);

impl Deref for SharedPool {
    type Target = DbPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Credential flows and session management
    pub auth: Arc<AuthServiceImpl>,
    /// Database connection pool (shared reference for health checks)
    pub pool: SharedPool,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(auth: AuthServiceImpl, pool: DbPool, config: Config) -> Self {
        Self {
            auth: Arc::new(auth),
            pool: SharedPool(Arc::new(pool)),
            config: Arc::new(config),
        }
    }

    /// Gate over the service's issuer and blacklist
    pub fn gate(&self) -> AuthorizationGate {
        self.auth.gate()
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}
