//! Common test utilities for warden-auth-core integration tests

pub mod mock_repos;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use warden_auth_core::{
    AuthCache, AuthConfig, AuthError, AuthService, CacheBackend, EmailSender, MemoryCache,
    NoopMetrics, PasswordHasher, TotpConfig, TotpEngine, TwoFactorAction,
};
use warden_types::{ClientInfo, LoginRequest, User};

#[allow(unused_imports)]
pub use mock_repos::{MockAuditRepository, MockSessionRepository, MockUserRepository};

pub const ACCESS_SECRET: &str = "access-secret-access-secret-access-secret";
pub const REFRESH_SECRET: &str = "refresh-secret-refresh-secret-refresh-secret";

/// Password that satisfies the default policy
pub const GOOD_PASSWORD: &str = "Correct1pass";

pub type TestService = AuthService<MockUserRepository, MockSessionRepository, MockAuditRepository>;

/// Argon2id with a tiny cost profile
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(1024, 1, 1).unwrap()
}

/// Code an authenticator would show right now for `secret`
#[allow(dead_code)]
pub fn current_totp(secret: &str) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    TotpEngine::new(TotpConfig::default()).generate_at(secret, now).unwrap()
}

/// Email captured by [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Otp { to: String, code: String },
    TwoFactor { to: String, action: TwoFactorAction },
}

/// Mailer that records instead of sending
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

#[allow(dead_code)]
impl RecordingMailer {
    pub fn fail_sends(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Record sends, then never complete them
    pub fn hang_sends(&self, hang: bool) {
        self.hanging.store(hang, Ordering::SeqCst);
    }

    async fn outcome(&self) -> Result<(), AuthError> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::Internal("smtp down".into()));
        }
        Ok(())
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Most recent OTP sent to `to`
    pub fn last_otp(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|m| match m {
            SentEmail::Otp { to: addr, code } if addr == to => Some(code),
            _ => None,
        })
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_otp(&self, to: &str, code: &str, _expiry_minutes: u64) -> Result<(), AuthError> {
        self.sent.lock().unwrap().push(SentEmail::Otp {
            to: to.to_string(),
            code: code.to_string(),
        });
        self.outcome().await
    }

    async fn send_2fa_notification(&self, to: &str, action: TwoFactorAction) -> Result<(), AuthError> {
        self.sent.lock().unwrap().push(SentEmail::TwoFactor {
            to: to.to_string(),
            action,
        });
        self.outcome().await
    }
}

/// In-memory cache that can be switched off to simulate an outage
#[derive(Default, Clone)]
pub struct OutageCache {
    inner: Arc<MemoryCache>,
    down: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl OutageCache {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AuthError> {
        if self.down.load(Ordering::SeqCst) {
            Err(AuthError::Cache("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for OutageCache {
    fn name(&self) -> &'static str {
        "outage"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.check()?;
        self.inner.take(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        self.check()?;
        self.inner.increment(key, ttl).await
    }

    async fn ping(&self) -> Result<(), AuthError> {
        self.check()
    }
}

/// Auth service wired to in-memory collaborators
#[allow(dead_code)]
pub struct Harness {
    pub service: TestService,
    pub users: MockUserRepository,
    pub sessions: MockSessionRepository,
    pub audit: MockAuditRepository,
    pub mailer: Arc<RecordingMailer>,
    pub cache: AuthCache,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::build(AuthConfig::new(ACCESS_SECRET, REFRESH_SECRET), Arc::new(MemoryCache::default()))
    }

    pub fn with_config(config: AuthConfig) -> Self {
        Self::build(config, Arc::new(MemoryCache::default()))
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self::build(AuthConfig::new(ACCESS_SECRET, REFRESH_SECRET), backend)
    }

    fn build(config: AuthConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let users = MockUserRepository::new();
        let sessions = MockSessionRepository::new(users.clone());
        let audit = MockAuditRepository::new();
        let mailer = Arc::new(RecordingMailer::default());
        let cache = AuthCache::new(backend, config.cache.key_prefix.clone(), Arc::new(NoopMetrics));

        let service = AuthService::new(
            config,
            Arc::new(users.clone()),
            Arc::new(sessions.clone()),
            Arc::new(audit.clone()),
            cache.clone(),
        )
        .unwrap()
        .with_hasher(fast_hasher())
        .with_mailer(mailer.clone());

        Self {
            service,
            users,
            sessions,
            audit,
            mailer,
            cache,
        }
    }

    /// Insert an active user with `password` hashed by the fast hasher
    pub fn seed_user(&self, username: &str, password: &str) -> User {
        let hash = fast_hasher().hash(password).unwrap();
        let user = User::new(username, format!("{username}@example.com"), hash);
        self.users.insert_user(user.clone());
        user
    }

    pub fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("192.0.2.10".into()),
            user_agent: Some("integration-test".into()),
            service_name: Some("iam".into()),
        }
    }

    pub fn login_request(username: &str, password: &str, totp: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
            totp_code: totp.into(),
        }
    }
}
