//! Auth service - credential flows over the hasher, TOTP engine, token
//! issuer, session store and ephemeral cache
//!
//! Dependency failures follow one rule. Reads that only tighten security
//! (blacklist, login-attempt counter) fail open. Writes that establish
//! security state (OTPs, reset tokens, pending 2FA, sessions, password
//! hashes) fail closed. Audit and email never fail the parent operation.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use warden_db::{AuditRepository, RolesAndPermissions, SessionRepository, UserRepository};
use warden_types::{
    is_valid_email, is_valid_username, ClientInfo, ForgotPasswordResult, ListSessionsParams,
    LoginRequest, LoginResult, Principal, ResetTokenResult, Session, SessionId, SessionInfo,
    TokenPair, TwoFactorSetup, User, UserId, UserInfo,
};

use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::cache::{AuthCache, PendingTwoFactor};
use crate::config::AuthConfig;
use crate::crypto::{hash_token, random_digits, random_hex};
use crate::email::{EmailSender, LogMailer, TwoFactorAction};
use crate::gate::AuthorizationGate;
use crate::observability::{NoopMetrics, Operation, Outcome, SharedMetrics};
use crate::password::{validate_password, HashScheme, PasswordHasher};
use crate::rate_limit::LoginRateLimiter;
use crate::session::{Rotation, SessionManager};
use crate::token::{TokenIssuer, TokenSubject};
use crate::totp::TotpEngine;
use crate::AuthError;

/// Recovery codes issued per two-factor activation
pub const RECOVERY_CODE_COUNT: usize = 8;

/// Random bytes per recovery code (10 hex characters)
const RECOVERY_CODE_BYTES: usize = 5;

/// Random bytes per password-reset token (64 hex characters)
const RESET_TOKEN_BYTES: usize = 32;

const OTP_DIGITS: u32 = 6;

/// Longest a flow waits on one outbound email
const MAIL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Authentication service
///
/// Provides:
/// - Login, logout and refresh-token rotation
/// - Password reset (OTP, reset token) and password change
/// - Two-factor enrollment and removal
/// - Session lookups for the session endpoints
pub struct AuthService<U: UserRepository, S: SessionRepository, A: AuditRepository> {
    config: AuthConfig,
    users: Arc<U>,
    sessions: SessionManager<S>,
    audit: AuditLogger<A>,
    cache: AuthCache,
    limiter: LoginRateLimiter,
    hasher: PasswordHasher,
    totp: TotpEngine,
    issuer: Arc<TokenIssuer>,
    mailer: Arc<dyn EmailSender>,
    metrics: SharedMetrics,
}

impl<U, S, A> AuthService<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditRepository,
{
    /// Create a new auth service.
    ///
    /// Fails if the config is invalid (short or shared JWT secrets, zero
    /// attempts, unsupported TOTP parameters).
    pub fn new(
        config: AuthConfig,
        users: Arc<U>,
        sessions: Arc<S>,
        audit: Arc<A>,
        cache: AuthCache,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let issuer = Arc::new(TokenIssuer::new(&config.token)?);

        Ok(Self {
            sessions: SessionManager::new(sessions, cache.clone()),
            audit: AuditLogger::new(audit),
            limiter: LoginRateLimiter::new(
                cache.clone(),
                config.security.max_login_attempts,
                config.security.lockout_duration,
            ),
            hasher: PasswordHasher::new(),
            totp: TotpEngine::new(config.totp.clone()),
            issuer,
            mailer: Arc::new(LogMailer),
            metrics: Arc::new(NoopMetrics),
            users,
            cache,
            config,
        })
    }

    /// Set the outbound mailer
    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Set the metrics recorder
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the password hasher (tests use a cheaper cost profile)
    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Token issuer shared with the gate
    pub fn issuer(&self) -> Arc<TokenIssuer> {
        Arc::clone(&self.issuer)
    }

    /// Authorization gate over this service's issuer, cache and metrics
    pub fn gate(&self) -> AuthorizationGate {
        AuthorizationGate::new(self.issuer(), Arc::clone(&self.metrics)).with_cache(self.cache.clone())
    }

    fn observe<T>(&self, operation: Operation, result: Result<T, AuthError>) -> Result<T, AuthError> {
        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.metrics.record_operation(operation, outcome);
        result
    }

    // =========================================================================
    // Login / Logout / Refresh
    // =========================================================================

    /// Authenticate with username, password and (if enabled) a TOTP code
    #[instrument(skip(self, request, client), fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> Result<LoginResult, AuthError> {
        let result = self.login_inner(request, client).await;
        self.observe(Operation::Login, result)
    }

    async fn login_inner(&self, request: LoginRequest, client: &ClientInfo) -> Result<LoginResult, AuthError> {
        let LoginRequest {
            username,
            password,
            totp_code,
        } = request;

        self.limiter.check(&username).await?;

        let mut user = self.authenticate(&username, &password).await?;

        if user.two_factor_enabled {
            if totp_code.is_empty() {
                return Err(AuthError::TwoFactorRequired);
            }
            let secret = user.two_factor_secret.as_deref().unwrap_or_default();
            if !self.totp.validate(secret, &totp_code) {
                tracing::info!(user_id = %user.id, "Invalid two-factor code at login");
                self.limiter.record_failure(&username).await;
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        let grants = self.users.find_roles_and_permissions(user.id).await?;
        let tokens = self.issuer.generate_pair(subject(&user, &grants))?;

        if self.config.security.migrate_legacy_hashes
            && HashScheme::detect(&user.password_hash) == HashScheme::Bcrypt
        {
            self.upgrade_legacy_hash(&mut user, password).await;
        }

        user.record_login_success(client.ip());
        self.users.update(&user).await?;
        self.limiter.reset(&username).await;

        self.sessions
            .create(user.id, &tokens.refresh_jti, tokens.refresh_expires_at, client)
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Login, Some(user.id))
                    .with_username(&user.username)
                    .with_client(client)
                    .with_description("User logged in"),
            )
            .await;
        tracing::info!(user_id = %user.id, "Login succeeded");

        Ok(LoginResult {
            tokens: TokenPair::bearer(tokens.access_token, tokens.refresh_token, tokens.expires_in),
            user: user_info(&user, grants),
        })
    }

    /// Resolve and password-check a user. Unknown usernames and wrong
    /// passwords are indistinguishable and both count against the limiter.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let found = if is_valid_username(username) {
            self.users.find_by_username(username).await?
        } else {
            None
        };
        let Some(mut user) = found else {
            self.limiter.record_failure(username).await;
            return Err(AuthError::InvalidCredentials);
        };

        user.can_login()?;

        let matches = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await?;
        if !matches {
            self.limiter.record_failure(username).await;
            let security = &self.config.security;
            let lockout = chrono::Duration::from_std(security.lockout_duration)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
            user.record_login_failure(security.max_login_attempts, lockout);
            if let Err(e) = self.users.update(&user).await {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to record login failure");
            }
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn upgrade_legacy_hash(&self, user: &mut User, password: String) {
        match self.hasher.hash_blocking(password).await {
            Ok(hash) => {
                // Same password, so password_changed_at stays as is
                user.password_hash = hash;
                tracing::info!(user_id = %user.id, "Upgraded legacy bcrypt hash");
            }
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "Legacy hash upgrade failed"),
        }
    }

    /// Revoke the session behind a refresh token
    #[instrument(skip(self, refresh_token, client))]
    pub async fn logout(&self, refresh_token: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let result = self.logout_inner(refresh_token, client).await;
        self.observe(Operation::Logout, result)
    }

    async fn logout_inner(&self, refresh_token: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let claims = self
            .issuer
            .validate_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;
        if self.is_blacklisted(&claims.jti).await {
            return Err(AuthError::InvalidToken);
        }

        self.blacklist(&claims.jti, claims.remaining_secs(1)).await;
        self.sessions.revoke_by_refresh_jti(&claims.jti).await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Logout, Some(claims.user_id))
                    .with_username(&claims.username)
                    .with_client(client)
                    .with_description("User logged out"),
            )
            .await;
        tracing::info!(user_id = %claims.user_id, "Logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair; the presented token is spent
    #[instrument(skip(self, refresh_token, client))]
    pub async fn refresh_token(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair, AuthError> {
        let result = self.refresh_inner(refresh_token, client).await;
        self.observe(Operation::RefreshToken, result)
    }

    async fn refresh_inner(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.validate_refresh(refresh_token)?;
        if self.is_blacklisted(&claims.jti).await {
            return Err(AuthError::TokenRevoked);
        }

        let session = self
            .sessions
            .find_by_refresh_jti(&claims.jti)
            .await?
            .filter(Session::is_active)
            .ok_or(AuthError::SessionNotFound)?;

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        let grants = match self.users.find_roles_and_permissions(user.id).await {
            Ok(grants) => grants,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Roles lookup failed during refresh, issuing without grants");
                RolesAndPermissions::default()
            }
        };

        let tokens = self.issuer.generate_pair(subject(&user, &grants))?;

        match self
            .sessions
            .rotate(&session, &tokens.refresh_jti, tokens.refresh_expires_at)
            .await?
        {
            Rotation::Rotated => {}
            Rotation::Lost => return Err(AuthError::TokenRevoked),
        }
        self.blacklist(&claims.jti, claims.remaining_secs(1)).await;

        self.audit
            .record(
                AuditEvent::new(AuditAction::RefreshToken, Some(user.id))
                    .with_username(&user.username)
                    .with_client(client)
                    .with_description("Access token refreshed"),
            )
            .await;

        Ok(TokenPair::bearer(tokens.access_token, tokens.refresh_token, tokens.expires_in))
    }

    async fn is_blacklisted(&self, jti: &str) -> bool {
        match self.cache.is_blacklisted(jti).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "Blacklist check unavailable");
                false
            }
        }
    }

    async fn blacklist(&self, jti: &str, ttl_secs: u64) {
        let ttl = Duration::from_secs(ttl_secs.max(1));
        if let Err(e) = self.cache.blacklist(jti, ttl).await {
            tracing::warn!(error = %e, "Failed to blacklist token");
        }
    }

    // =========================================================================
    // Password reset and change
    // =========================================================================

    /// Start a password reset. The response is the same whether or not
    /// `email` belongs to an account.
    #[instrument(skip(self, email))]
    pub async fn forgot_password(&self, email: &str) -> Result<ForgotPasswordResult, AuthError> {
        let result = self.forgot_inner(email).await;
        self.observe(Operation::ForgotPassword, result)
    }

    async fn forgot_inner(&self, email: &str) -> Result<ForgotPasswordResult, AuthError> {
        let ttl = self.config.security.otp_ttl;
        let response = ForgotPasswordResult {
            otp_expires_in_secs: ttl.as_secs(),
        };

        let user = if is_valid_email(email) {
            self.users.find_by_email(email).await?
        } else {
            None
        };
        let Some(user) = user else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(response);
        };

        let otp = random_digits(OTP_DIGITS);
        self.cache.store_otp(user.id, &otp, ttl).await?;

        let minutes = ttl.as_secs().div_ceil(60);
        match tokio::time::timeout(MAIL_SEND_TIMEOUT, self.mailer.send_otp(&user.email, &otp, minutes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(user_id = %user.id, error = %e, "Failed to send reset OTP email"),
            Err(_) => tracing::warn!(user_id = %user.id, "Reset OTP email timed out"),
        }

        self.audit
            .record(
                AuditEvent::new(AuditAction::ForgotPassword, Some(user.id))
                    .with_username(&user.username)
                    .with_description("Password reset requested"),
            )
            .await;
        Ok(response)
    }

    /// Trade a valid reset OTP for a single-use reset token
    #[instrument(skip(self, email, code))]
    pub async fn verify_reset_otp(&self, email: &str, code: &str) -> Result<ResetTokenResult, AuthError> {
        let result = self.verify_otp_inner(email, code).await;
        self.observe(Operation::VerifyResetOtp, result)
    }

    async fn verify_otp_inner(&self, email: &str, code: &str) -> Result<ResetTokenResult, AuthError> {
        let user = if is_valid_email(email) {
            self.users.find_by_email(email).await?
        } else {
            None
        };
        let Some(user) = user else {
            return Err(AuthError::InvalidOtp);
        };

        if !self.cache.consume_otp(user.id, code).await? {
            tracing::info!(user_id = %user.id, "Reset OTP rejected");
            return Err(AuthError::InvalidOtp);
        }

        let ttl = self.config.security.reset_token_ttl;
        let token = random_hex(RESET_TOKEN_BYTES);
        self.cache.store_reset_token(&token, user.id, ttl).await?;

        Ok(ResetTokenResult {
            reset_token: token,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Set a new password with a reset token. The token is spent even if
    /// the update fails afterwards.
    #[instrument(skip(self, reset_token, new_password))]
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<(), AuthError> {
        let result = self.reset_inner(reset_token, new_password).await;
        self.observe(Operation::ResetPassword, result)
    }

    async fn reset_inner(&self, reset_token: &str, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password, &self.config.password)?;

        let user_id = self
            .cache
            .take_reset_token(reset_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let hash = self.hasher.hash_blocking(new_password.to_string()).await?;
        user.update_password(hash)?;
        self.users.update(&user).await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::ResetPassword, Some(user.id))
                    .with_username(&user.username)
                    .with_description("Password reset completed"),
            )
            .await;
        tracing::info!(%user_id, "Password reset");
        Ok(())
    }

    /// Change the password of a signed-in user
    #[instrument(skip(self, current_password, new_password))]
    pub async fn update_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let result = self.update_password_inner(user_id, current_password, new_password).await;
        self.observe(Operation::UpdatePassword, result)
    }

    async fn update_password_inner(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password, &self.config.password)?;

        let mut user = self.load_user(user_id).await?;
        self.require_password(&user, current_password).await?;

        let hash = self.hasher.hash_blocking(new_password.to_string()).await?;
        user.update_password(hash)?;
        self.users.update(&user).await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::ChangePassword, Some(user.id))
                    .with_username(&user.username)
                    .with_description("Password changed"),
            )
            .await;
        Ok(())
    }

    // =========================================================================
    // Two-factor authentication
    // =========================================================================

    /// Start two-factor enrollment. Nothing changes on the user until
    /// [`AuthService::verify_2fa`] confirms a code for the new secret.
    #[instrument(skip(self))]
    pub async fn enable_2fa(&self, user_id: UserId) -> Result<TwoFactorSetup, AuthError> {
        let result = self.enable_2fa_inner(user_id).await;
        self.observe(Operation::Enable2fa, result)
    }

    async fn enable_2fa_inner(&self, user_id: UserId) -> Result<TwoFactorSetup, AuthError> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = self.totp.generate_secret();
        let provisioning_uri = self.totp.provisioning_uri(&secret, &user.email)?;
        let recovery_codes: Vec<String> = (0..RECOVERY_CODE_COUNT)
            .map(|_| random_hex(RECOVERY_CODE_BYTES))
            .collect();

        let pending = PendingTwoFactor {
            secret,
            recovery_codes,
        };
        self.cache
            .store_pending_2fa(user_id, &pending, self.config.security.two_factor_setup_ttl)
            .await?;

        tracing::info!(%user_id, "Two-factor setup started");
        Ok(TwoFactorSetup {
            secret: pending.secret,
            provisioning_uri,
            recovery_codes: pending.recovery_codes,
        })
    }

    /// Confirm the pending setup with a code from the authenticator
    #[instrument(skip(self, code))]
    pub async fn verify_2fa(&self, user_id: UserId, code: &str) -> Result<(), AuthError> {
        let result = self.verify_2fa_inner(user_id, code).await;
        self.observe(Operation::Verify2fa, result)
    }

    async fn verify_2fa_inner(&self, user_id: UserId, code: &str) -> Result<(), AuthError> {
        let mut user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let pending = self
            .cache
            .pending_2fa(user_id)
            .await?
            .ok_or(AuthError::TwoFactorSetupExpired)?;
        if !self.totp.validate(&pending.secret, code) {
            return Err(AuthError::InvalidTwoFactorCode);
        }
        // Claim the pending entry; a concurrent verify that got here first wins
        if !self.cache.take_pending_2fa(user_id).await? {
            return Err(AuthError::TwoFactorSetupExpired);
        }

        user.enable_two_factor(pending.secret)?;
        self.users.update(&user).await?;

        let hashes: Vec<String> = pending.recovery_codes.iter().map(|c| hash_token(c)).collect();
        if let Err(e) = self.users.store_recovery_codes(user_id, &hashes).await {
            tracing::warn!(%user_id, error = %e, "Failed to store recovery codes");
        }

        self.notify_2fa(&user, TwoFactorAction::Enabled).await;
        self.audit
            .record(
                AuditEvent::new(AuditAction::Enable2fa, Some(user.id))
                    .with_username(&user.username)
                    .with_description("Two-factor authentication enabled"),
            )
            .await;
        tracing::info!(%user_id, "Two-factor enabled");
        Ok(())
    }

    /// Turn two-factor off. Needs the password and either a current TOTP
    /// code or an unused recovery code.
    #[instrument(skip(self, password, code))]
    pub async fn disable_2fa(&self, user_id: UserId, password: &str, code: &str) -> Result<(), AuthError> {
        let result = self.disable_2fa_inner(user_id, password, code).await;
        self.observe(Operation::Disable2fa, result)
    }

    async fn disable_2fa_inner(&self, user_id: UserId, password: &str, code: &str) -> Result<(), AuthError> {
        let mut user = self.load_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.require_password(&user, password).await?;

        let totp_ok = user
            .two_factor_secret
            .as_deref()
            .is_some_and(|secret| self.totp.validate(secret, code));
        if !totp_ok && !self.use_recovery_code(user_id, code).await {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        user.disable_two_factor();
        self.users.update(&user).await?;

        if let Err(e) = self.users.delete_recovery_codes(user_id).await {
            tracing::warn!(%user_id, error = %e, "Failed to delete recovery codes");
        }

        self.notify_2fa(&user, TwoFactorAction::Disabled).await;
        self.audit
            .record(
                AuditEvent::new(AuditAction::Disable2fa, Some(user.id))
                    .with_username(&user.username)
                    .with_description("Two-factor authentication disabled"),
            )
            .await;
        tracing::info!(%user_id, "Two-factor disabled");
        Ok(())
    }

    async fn use_recovery_code(&self, user_id: UserId, code: &str) -> bool {
        if code.is_empty() {
            return false;
        }
        match self.users.use_recovery_code(user_id, &hash_token(code)).await {
            Ok(used) => used,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Recovery code check failed");
                false
            }
        }
    }

    async fn notify_2fa(&self, user: &User, action: TwoFactorAction) {
        match tokio::time::timeout(MAIL_SEND_TIMEOUT, self.mailer.send_2fa_notification(&user.email, action)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(user_id = %user.id, error = %e, "Failed to send 2FA notification"),
            Err(_) => tracing::warn!(user_id = %user.id, "2FA notification timed out"),
        }
    }

    // =========================================================================
    // Current user and sessions
    // =========================================================================

    /// Profile of the caller with fresh roles and permissions
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn current_user(&self, principal: &Principal) -> Result<UserInfo, AuthError> {
        let user = self.load_user(principal.user_id).await?;
        let grants = self.users.find_roles_and_permissions(user.id).await?;
        Ok(user_info(&user, grants))
    }

    /// Newest active session of the caller
    pub async fn current_session(&self, user_id: UserId) -> Result<Session, AuthError> {
        self.sessions.current(user_id).await
    }

    /// Revoke any session by id
    #[instrument(skip(self))]
    pub async fn revoke_session(&self, session_id: SessionId) -> Result<(), AuthError> {
        self.sessions.revoke(session_id).await
    }

    /// Revoke every session of a user; returns how many were active
    #[instrument(skip(self))]
    pub async fn revoke_user_sessions(&self, user_id: UserId) -> Result<u64, AuthError> {
        self.sessions.revoke_all(user_id).await
    }

    /// Page through active sessions
    pub async fn list_active_sessions(
        &self,
        params: &ListSessionsParams,
    ) -> Result<(Vec<SessionInfo>, u64), AuthError> {
        self.sessions.list_active(params).await
    }

    /// Delete expired session rows
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions.cleanup_expired().await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users.find_by_id(user_id).await?.ok_or(AuthError::NotFound)
    }

    async fn require_password(&self, user: &User, password: &str) -> Result<(), AuthError> {
        let matches = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await?;
        if matches {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

impl<U, S, A> std::fmt::Debug for AuthService<U, S, A>
where
    U: UserRepository,
    S: SessionRepository,
    A: AuditRepository,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn subject<'a>(user: &'a User, grants: &'a RolesAndPermissions) -> TokenSubject<'a> {
    TokenSubject {
        user_id: user.id,
        username: &user.username,
        email: &user.email,
        roles: &grants.roles,
        permissions: &grants.permissions,
    }
}

fn user_info(user: &User, grants: RolesAndPermissions) -> UserInfo {
    UserInfo {
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        two_factor_enabled: user.two_factor_enabled,
        roles: grants.roles,
        permissions: grants.permissions,
    }
}
