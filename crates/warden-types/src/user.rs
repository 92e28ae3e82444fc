//! User types

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::UserStateError;

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{2,49}$").expect("username pattern is a valid regex")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Returns true if `username` has a shape the directory could ever store.
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_PATTERN.is_match(username)
}

/// Returns true if `email` is syntactically plausible.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identity root for authentication.
///
/// Users are never deleted by the auth core, only deactivated. All
/// credential state changes go through the methods below so the lockout
/// and two-factor invariants stay in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    /// Encoded hash, tagged by algorithm prefix (`$argon2id$` or `$2b$`)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    /// Only set once a pending setup has been verified
    #[serde(skip_serializing, default)]
    pub two_factor_secret: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create an active user with no login history
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username: username.into(),
            email: email.into(),
            full_name: None,
            password_hash: password_hash.into(),
            is_active: true,
            is_locked: false,
            failed_login_attempts: 0,
            locked_until: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            last_login_at: None,
            last_login_ip: None,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the user may attempt a login.
    ///
    /// An expired lockout is lifted in place, so callers must persist the
    /// user afterwards if they want the unlock to stick.
    pub fn can_login(&mut self) -> Result<(), UserStateError> {
        self.can_login_at(Utc::now())
    }

    /// [`User::can_login`] against an explicit clock
    pub fn can_login_at(&mut self, now: DateTime<Utc>) -> Result<(), UserStateError> {
        if !self.is_active {
            return Err(UserStateError::Inactive);
        }
        if self.is_locked {
            match self.locked_until {
                Some(until) if now > until => self.unlock(),
                _ => return Err(UserStateError::Locked),
            }
        }
        Ok(())
    }

    /// Record a successful login from `ip`
    pub fn record_login_success(&mut self, ip: impl Into<String>) {
        let now = Utc::now();
        self.last_login_at = Some(now);
        self.last_login_ip = Some(ip.into());
        self.failed_login_attempts = 0;
        self.is_locked = false;
        self.locked_until = None;
        self.updated_at = now;
    }

    /// Record a failed login, locking the account once `max_attempts` is reached
    pub fn record_login_failure(&mut self, max_attempts: u32, lockout: Duration) {
        let now = Utc::now();
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
        if i64::from(self.failed_login_attempts) >= i64::from(max_attempts) {
            self.is_locked = true;
            self.locked_until = Some(now + lockout);
        }
        self.updated_at = now;
    }

    /// Replace the password hash
    pub fn update_password(&mut self, password_hash: impl Into<String>) -> Result<(), UserStateError> {
        let password_hash = password_hash.into();
        if password_hash.is_empty() {
            return Err(UserStateError::EmptyPassword);
        }
        let now = Utc::now();
        self.password_hash = password_hash;
        self.password_changed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Activate two-factor authentication with a verified secret
    pub fn enable_two_factor(&mut self, secret: impl Into<String>) -> Result<(), UserStateError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(UserStateError::EmptySecret);
        }
        self.two_factor_secret = Some(secret);
        self.two_factor_enabled = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Clear the two-factor secret
    pub fn disable_two_factor(&mut self) {
        self.two_factor_secret = None;
        self.two_factor_enabled = false;
        self.updated_at = Utc::now();
    }

    /// Lift a lockout and reset the failure counter
    pub fn unlock(&mut self) {
        self.is_locked = false;
        self.failed_login_attempts = 0;
        self.locked_until = None;
        self.updated_at = Utc::now();
    }
}
