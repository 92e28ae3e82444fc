//! Configuration types for the auth core

use std::time::Duration;

use crate::AuthError;

/// Token issuer configuration
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,
    /// HMAC secret for refresh tokens; must differ from the access secret
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl TokenConfig {
    /// Minimum secret length in bytes (256 bits)
    pub const MIN_SECRET_LENGTH: usize = 32;

    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            issuer: "goapps-iam".to_string(),
        }
    }

    /// Reject short or shared secrets
    pub fn validate(&self) -> Result<(), AuthError> {
        for (name, secret) in [
            ("access", &self.access_secret),
            ("refresh", &self.refresh_secret),
        ] {
            if secret.len() < Self::MIN_SECRET_LENGTH {
                return Err(AuthError::Configuration(format!(
                    "{name} token secret must be at least {} bytes, got {}",
                    Self::MIN_SECRET_LENGTH,
                    secret.len()
                )));
            }
        }
        if self.access_secret == self.refresh_secret {
            return Err(AuthError::Configuration(
                "access and refresh token secrets must differ".to_string(),
            ));
        }
        if self.access_ttl.is_zero() || self.refresh_ttl.is_zero() {
            return Err(AuthError::Configuration("token TTLs must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Password composition rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

/// TOTP parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpConfig {
    /// Issuer label shown by authenticator apps
    pub issuer: String,
    pub digits: u32,
    pub period_secs: u64,
    /// Periods accepted either side of the current one
    pub skew: u8,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "GoApps".to_string(),
            digits: 6,
            period_secs: 30,
            skew: 1,
        }
    }
}

/// Lockout and one-time artifact lifetimes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub max_login_attempts: u32,
    pub lockout_duration: Duration,
    pub otp_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub two_factor_setup_ttl: Duration,
    /// Re-hash bcrypt passwords with Argon2id after a successful login
    pub migrate_legacy_hashes: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            otp_ttl: Duration::from_secs(5 * 60),
            reset_token_ttl: Duration::from_secs(10 * 60),
            two_factor_setup_ttl: Duration::from_secs(10 * 60),
            migrate_legacy_hashes: false,
        }
    }
}

/// Ephemeral cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Prepended to every key
    pub key_prefix: String,
    /// Upper bound on entries for the in-memory backend
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "iam:".to_string(),
            max_capacity: 100_000,
        }
    }
}

/// Auth core configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: TokenConfig,
    pub password: PasswordPolicy,
    pub totp: TotpConfig,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
}

impl AuthConfig {
    /// Create a config with default lifetimes and policy
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            token: TokenConfig::new(access_secret, refresh_secret),
            password: PasswordPolicy::default(),
            totp: TotpConfig::default(),
            security: SecurityConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Validate the whole config
    pub fn validate(&self) -> Result<(), AuthError> {
        self.token.validate()?;
        if self.security.max_login_attempts == 0 {
            return Err(AuthError::Configuration(
                "max login attempts must be at least 1".to_string(),
            ));
        }
        if !(6..=8).contains(&self.totp.digits) || self.totp.period_secs == 0 {
            return Err(AuthError::Configuration(format!(
                "unsupported TOTP parameters: {} digits, {}s period",
                self.totp.digits, self.totp.period_secs
            )));
        }
        Ok(())
    }

    /// Set access and refresh token lifetimes
    #[must_use]
    pub fn with_token_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.token.access_ttl = access;
        self.token.refresh_ttl = refresh;
        self
    }

    /// Set token issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token.issuer = issuer.into();
        self
    }

    /// Set password policy
    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password = policy;
        self
    }

    /// Set TOTP parameters
    #[must_use]
    pub fn with_totp(mut self, totp: TotpConfig) -> Self {
        self.totp = totp;
        self
    }

    /// Set lockout and artifact lifetimes
    #[must_use]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Set cache options
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
