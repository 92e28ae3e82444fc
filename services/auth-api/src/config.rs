//! Configuration for the Auth API service.

use std::str::FromStr;
use std::time::Duration;

use warden_auth_core::{AuthConfig, PasswordPolicy, SecurityConfig, SmtpConfig, TotpConfig};

/// Auth API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,

    /// Database URL
    pub database_url: String,

    pub database_max_connections: u32,

    /// Redis URL; the in-memory cache is used when unset
    pub redis_url: Option<String>,

    /// Auth core configuration
    pub auth: AuthConfig,

    /// Outbound mail; OTPs are only logged when unset
    pub smtp: Option<SmtpConfig>,

    /// Request timeout for API routes
    pub request_timeout: Duration,

    /// Metrics enabled
    pub metrics_enabled: bool,

    /// Global request rate and burst
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,

    /// Interval between expired-session sweeps
    pub session_cleanup_interval: Duration,
}

/// Environment lookup with typed defaults
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty value of `name`
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
            None => Ok(default),
        }
    }

    fn secs_or(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid(name)),
            None => Ok(default),
        }
    }

    fn flag_or(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(_) => Err(ConfigError::Invalid(name)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        // Database
        let database_url = env.required("DATABASE_URL")?;
        let database_max_connections = env.parse_or("DATABASE_MAX_CONNECTIONS", 25)?;
        let redis_url = env.get("REDIS_URL");

        // Tokens
        let access_secret = env.required("JWT_ACCESS_SECRET")?;
        let refresh_secret = env.required("JWT_REFRESH_SECRET")?;
        let defaults = AuthConfig::new(access_secret.as_str(), refresh_secret.as_str());
        let access_ttl = env.secs_or("JWT_ACCESS_TTL_SECS", defaults.token.access_ttl)?;
        let refresh_ttl = env.secs_or("JWT_REFRESH_TTL_SECS", defaults.token.refresh_ttl)?;
        let issuer = env.get("JWT_ISSUER").unwrap_or_else(|| defaults.token.issuer.clone());

        // TOTP
        let totp_defaults = TotpConfig::default();
        let totp = TotpConfig {
            issuer: env.get("TOTP_ISSUER").unwrap_or(totp_defaults.issuer),
            digits: env.parse_or("TOTP_DIGITS", totp_defaults.digits)?,
            period_secs: env.parse_or("TOTP_PERIOD_SECS", totp_defaults.period_secs)?,
            skew: totp_defaults.skew,
        };

        // Lockout and one-time artifacts
        let security_defaults = SecurityConfig::default();
        let security = SecurityConfig {
            max_login_attempts: env.parse_or("MAX_LOGIN_ATTEMPTS", security_defaults.max_login_attempts)?,
            lockout_duration: env.secs_or("LOCKOUT_DURATION_SECS", security_defaults.lockout_duration)?,
            otp_ttl: env.secs_or("OTP_TTL_SECS", security_defaults.otp_ttl)?,
            reset_token_ttl: env.secs_or("RESET_TOKEN_TTL_SECS", security_defaults.reset_token_ttl)?,
            migrate_legacy_hashes: env.flag_or("MIGRATE_LEGACY_HASHES", security_defaults.migrate_legacy_hashes)?,
            ..security_defaults
        };

        // Password policy
        let policy_defaults = PasswordPolicy::default();
        let password = PasswordPolicy {
            min_length: env.parse_or("PASSWORD_MIN_LENGTH", policy_defaults.min_length)?,
            require_special: env.flag_or("PASSWORD_REQUIRE_SPECIAL", policy_defaults.require_special)?,
            ..policy_defaults
        };

        let auth = defaults
            .with_token_ttls(access_ttl, refresh_ttl)
            .with_issuer(issuer)
            .with_totp(totp)
            .with_security(security)
            .with_password_policy(password);
        auth.validate().map_err(|e| ConfigError::Auth(e.to_string()))?;

        // Mail
        let smtp = match env.get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: env.parse_or("SMTP_PORT", 587)?,
                username: env.get("SMTP_USER"),
                password: env.get("SMTP_PASSWORD"),
                from_address: env
                    .get("SMTP_FROM_ADDRESS")
                    .unwrap_or_else(|| "noreply@goapps.local".to_string()),
                from_name: env.get("SMTP_FROM_NAME").unwrap_or_else(|| "GoApps IAM".to_string()),
                tls: env.flag_or("SMTP_TLS", true)?,
            }),
            None => None,
        };

        // Server
        let http_port = env.parse_or("HTTP_PORT", 8081)?;
        let request_timeout = env.secs_or("REQUEST_TIMEOUT_SECS", Duration::from_secs(30))?;
        let metrics_enabled = env.flag_or("METRICS_ENABLED", true)?;

        let rate_limit_rps: u32 = env.parse_or("RATE_LIMIT_RPS", 100)?;
        let rate_limit_burst = env.parse_or("RATE_LIMIT_BURST", rate_limit_rps.saturating_mul(2))?;
        if rate_limit_rps == 0 {
            return Err(ConfigError::Invalid("RATE_LIMIT_RPS"));
        }

        let session_cleanup_interval =
            env.secs_or("SESSION_CLEANUP_INTERVAL_SECS", Duration::from_secs(60 * 60))?;

        Ok(Self {
            http_port,
            database_url,
            database_max_connections,
            redis_url,
            auth,
            smtp,
            request_timeout,
            metrics_enabled,
            rate_limit_rps,
            rate_limit_burst,
            session_cleanup_interval,
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Auth config error: {0}")]
    Auth(String),
}
