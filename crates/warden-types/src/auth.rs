//! Authentication types

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Role name that bypasses every permission check
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

/// Authenticated caller, built from validated access-token claims only.
///
/// Handlers receive this as an explicit value; roles and permissions are
/// never re-read from storage per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// jti of the access token that authenticated the call
    pub token_id: String,
}

impl Principal {
    /// True if the principal holds the super-admin role
    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(|r| r == SUPER_ADMIN_ROLE)
    }

    /// True if the principal holds `permission` exactly
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Transport metadata about the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Name of the downstream service the login is for
    pub service_name: Option<String>,
}

impl ClientInfo {
    /// IP address or an empty string
    pub fn ip(&self) -> &str {
        self.ip_address.as_deref().unwrap_or_default()
    }
}

/// Token pair returned after authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived, single use)
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    /// Build a bearer token pair
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Public profile returned with a login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub two_factor_enabled: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserInfo,
}

/// Login credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Required only when the account has two-factor enabled
    #[serde(default)]
    pub totp_code: String,
}

/// Result of a password-reset request. Identical for known and unknown emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgotPasswordResult {
    pub otp_expires_in_secs: u64,
}

/// Issued after a reset OTP is verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetTokenResult {
    pub reset_token: String,
    pub expires_in_secs: u64,
}

/// Pending two-factor enrollment handed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSetup {
    /// TOTP secret (base32, no padding)
    pub secret: String,
    /// otpauth:// URI for QR enrollment
    pub provisioning_uri: String,
    /// Plaintext single-use codes; shown once
    pub recovery_codes: Vec<String>,
}
