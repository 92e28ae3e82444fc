//! Warden Auth Core - Authentication business logic
//!
//! Password hashing, TOTP, JWT issuing, the session store, the ephemeral
//! cache, the credential flows in [`AuthService`] and the
//! [`AuthorizationGate`] that fronts every protected method.

pub mod audit;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod email;
pub mod error;
pub mod gate;
pub mod observability;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod token;
pub mod totp;

pub use audit::{AuditAction, AuditEvent, AuditLogger};
pub use breaker::{BreakerConfig, BreakerObserver, BreakerState, CircuitBreaker, MetricsObserver};
pub use cache::{AuthCache, CacheBackend, GuardedCache, MemoryCache, PendingTwoFactor, RedisCache};
pub use config::{AuthConfig, CacheConfig, PasswordPolicy, SecurityConfig, TokenConfig, TotpConfig};
pub use email::{EmailSender, LogMailer, SmtpConfig, SmtpMailer, TwoFactorAction};
pub use error::*;
pub use gate::{is_public_method, parse_bearer, required_permission, Access, AuthorizationGate};
pub use observability::{AuthMetrics, NoopMetrics, PrometheusMetrics, SharedMetrics};
pub use password::{validate_password, HashScheme, PasswordHasher};
pub use rate_limit::LoginRateLimiter;
pub use service::*;
pub use session::{Rotation, SessionManager};
pub use token::{Claims, IssuedTokens, TokenIssuer, TokenSubject, TokenType};
pub use totp::TotpEngine;
