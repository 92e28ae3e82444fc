//! Auth errors

use std::fmt;

use thiserror::Error;
use warden_types::UserStateError;

/// Password policy rule, in the order rules are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl PolicyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinLength => "min_length",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Digit => "digit",
            Self::Special => "special",
        }
    }
}

/// A single violated password rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub field: &'static str,
    pub rule: PolicyRule,
    pub message: String,
}

impl PolicyViolation {
    pub(crate) fn new(rule: PolicyRule, message: impl Into<String>) -> Self {
        Self {
            field: "password",
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Coarse error category used by transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Locked,
    Authorization,
    Conflict,
    Validation,
    NotFound,
    Infrastructure,
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user or wrong password; the two are never distinguished
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is temporarily locked")]
    AccountLocked,

    #[error("account is inactive")]
    AccountInactive,

    /// Malformed token, bad signature or wrong token type
    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    /// Blacklisted or already rotated
    #[error("token has been revoked")]
    TokenRevoked,

    #[error("session not found")]
    SessionNotFound,

    #[error("two-factor code required")]
    TwoFactorRequired,

    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("two-factor authentication already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("two-factor authentication not enabled")]
    TwoFactorNotEnabled,

    /// Verify2FA without a live pending setup
    #[error("two-factor setup expired or not initiated")]
    TwoFactorSetupExpired,

    #[error("invalid or expired OTP")]
    InvalidOtp,

    /// Missing or malformed credentials at the gate
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(PolicyViolation),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials
            | Self::AccountInactive
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::SessionNotFound
            | Self::TwoFactorRequired
            | Self::InvalidTwoFactorCode
            | Self::TwoFactorSetupExpired
            | Self::InvalidOtp
            | Self::Unauthenticated(_) => ErrorKind::Authentication,
            Self::AccountLocked => ErrorKind::Locked,
            Self::PermissionDenied(_) => ErrorKind::Authorization,
            Self::TwoFactorAlreadyEnabled | Self::TwoFactorNotEnabled => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound => ErrorKind::NotFound,
            Self::Cache(_) | Self::Database(_) | Self::Configuration(_) | Self::Internal(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Authentication => 401,
            ErrorKind::Locked => 423,
            ErrorKind::Authorization => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Infrastructure => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::TwoFactorRequired => "TWO_FACTOR_REQUIRED",
            Self::InvalidTwoFactorCode => "INVALID_TWO_FACTOR_CODE",
            Self::TwoFactorAlreadyEnabled => "TWO_FACTOR_ALREADY_ENABLED",
            Self::TwoFactorNotEnabled => "TWO_FACTOR_NOT_ENABLED",
            Self::TwoFactorSetupExpired => "TWO_FACTOR_SETUP_EXPIRED",
            Self::InvalidOtp => "INVALID_OTP",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Code safe to return to callers.
    ///
    /// Mirrors [`public_message`](Self::public_message): credential
    /// failures that do not drive the flow share `UNAUTHENTICATED`, and
    /// every dependency failure is `INTERNAL_ERROR`. [`error_code`](Self::error_code)
    /// keeps the precise variant for logs and metrics.
    pub fn public_code(&self) -> &'static str {
        match self {
            Self::TwoFactorRequired
            | Self::InvalidTwoFactorCode
            | Self::TwoFactorSetupExpired
            | Self::TokenExpired
            | Self::InvalidOtp => self.error_code(),
            _ => match self.kind() {
                ErrorKind::Authentication => "UNAUTHENTICATED",
                ErrorKind::Infrastructure => "INTERNAL_ERROR",
                _ => self.error_code(),
            },
        }
    }

    /// Message safe to return to callers.
    ///
    /// Credential failures keep their own text only where the caller needs
    /// it to continue the flow (2FA prompts, token expiry). Infrastructure
    /// detail never leaves the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::TwoFactorRequired
            | Self::InvalidTwoFactorCode
            | Self::TwoFactorSetupExpired
            | Self::TokenExpired
            | Self::AccountLocked
            | Self::TwoFactorAlreadyEnabled
            | Self::TwoFactorNotEnabled
            | Self::InvalidOtp
            | Self::NotFound => self.to_string(),
            Self::PermissionDenied(_) => "permission denied".to_string(),
            Self::Validation(v) => v.message.clone(),
            _ => match self.kind() {
                ErrorKind::Authentication => "invalid credentials".to_string(),
                _ => "internal error".to_string(),
            },
        }
    }
}

impl From<warden_db::DbError> for AuthError {
    fn from(err: warden_db::DbError) -> Self {
        match err {
            warden_db::DbError::NotFound => Self::NotFound,
            other => {
                tracing::error!("Database error: {}", other);
                Self::Database(other.to_string())
            }
        }
    }
}

impl From<UserStateError> for AuthError {
    fn from(err: UserStateError) -> Self {
        match err {
            UserStateError::Inactive => Self::AccountInactive,
            UserStateError::Locked => Self::AccountLocked,
            UserStateError::EmptyPassword | UserStateError::EmptySecret => {
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_kind() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert_eq!(AuthError::AccountLocked.status_code(), 423);
        assert_eq!(AuthError::PermissionDenied("x".into()).status_code(), 403);
        assert_eq!(AuthError::TwoFactorAlreadyEnabled.status_code(), 409);
        assert_eq!(AuthError::Database("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_root_cause() {
        assert_eq!(AuthError::TokenRevoked.public_message(), "invalid credentials");
        assert_eq!(AuthError::SessionNotFound.public_message(), "invalid credentials");
        assert_eq!(
            AuthError::Database("connection refused at 10.0.0.5".into()).public_message(),
            "internal error"
        );
        assert_eq!(
            AuthError::PermissionDenied("iam.user.account.create".into()).public_message(),
            "permission denied"
        );
    }

    #[test]
    fn test_public_code_collapses_root_cause() {
        assert_eq!(AuthError::AccountInactive.public_code(), AuthError::InvalidCredentials.public_code());
        assert_eq!(AuthError::TokenRevoked.public_code(), "UNAUTHENTICATED");
        assert_eq!(AuthError::Cache("down".into()).public_code(), "INTERNAL_ERROR");
        assert_eq!(AuthError::InvalidTwoFactorCode.public_code(), "INVALID_TWO_FACTOR_CODE");
        assert_eq!(AuthError::AccountLocked.public_code(), "ACCOUNT_LOCKED");
        assert_eq!(AuthError::AccountInactive.error_code(), "ACCOUNT_INACTIVE");
    }

    #[test]
    fn test_validation_surfaces_rule() {
        let err = AuthError::Validation(PolicyViolation::new(
            PolicyRule::Uppercase,
            "password must contain at least one uppercase letter",
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.public_message().contains("uppercase"));
    }

    #[test]
    fn test_db_not_found_maps_to_not_found() {
        let err: AuthError = warden_db::DbError::NotFound.into();
        assert!(matches!(err, AuthError::NotFound));
    }
}
