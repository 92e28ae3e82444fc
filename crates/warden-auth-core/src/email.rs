//! Outbound email port
//!
//! The orchestrator only needs two messages: the password-reset OTP and a
//! notice when two-factor authentication is switched on or off. Delivery is
//! best-effort; callers log failures and carry on.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::AuthError;

/// Two-factor change announced to the account owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorAction {
    Enabled,
    Disabled,
}

impl TwoFactorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// Sends account emails
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a password-reset OTP
    async fn send_otp(&self, to: &str, code: &str, expiry_minutes: u64) -> Result<(), AuthError>;

    /// Tell the owner two-factor authentication changed
    async fn send_2fa_notification(&self, to: &str, action: TwoFactorAction) -> Result<(), AuthError>;
}

/// Logs instead of sending; used when no SMTP host is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send_otp(&self, to: &str, _code: &str, expiry_minutes: u64) -> Result<(), AuthError> {
        tracing::info!(to, expiry_minutes, "SMTP not configured, reset OTP email skipped");
        Ok(())
    }

    async fn send_2fa_notification(&self, to: &str, action: TwoFactorAction) -> Result<(), AuthError> {
        tracing::info!(to, action = action.as_str(), "SMTP not configured, 2FA notice skipped");
        Ok(())
    }
}

/// SMTP connection settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    /// STARTTLS when true, plaintext otherwise
    pub tls: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from_address", &self.from_address)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

/// SMTP mailer on lettre's tokio transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AuthError> {
        let mut builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AuthError::Configuration(format!("SMTP relay {}: {e}", config.host)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Configuration(format!("invalid SMTP from address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), AuthError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Internal(format!("invalid recipient address: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AuthError::Internal(format!("build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AuthError::Internal(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send_otp(&self, to: &str, code: &str, expiry_minutes: u64) -> Result<(), AuthError> {
        let body = format!(
            "Your password reset code is {code}.\n\n\
             It expires in {expiry_minutes} minutes. If you did not request a reset, ignore this email."
        );
        self.send(to, "Password reset code", body).await
    }

    async fn send_2fa_notification(&self, to: &str, action: TwoFactorAction) -> Result<(), AuthError> {
        let body = format!(
            "Two-factor authentication was {} on your account.\n\n\
             If this was not you, contact your administrator immediately.",
            action.as_str()
        );
        self.send(to, "Two-factor authentication changed", body).await
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(tls: bool) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: Some("mailer".into()),
            password: Some("hunter2".into()),
            from_address: "noreply@example.com".into(),
            from_name: "GoApps IAM".into(),
            tls,
        }
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        let mailer = LogMailer;
        mailer.send_otp("a@example.com", "123456", 5).await.unwrap();
        mailer
            .send_2fa_notification("a@example.com", TwoFactorAction::Disabled)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds() {
        assert!(SmtpMailer::new(&smtp(true)).is_ok());
        assert!(SmtpMailer::new(&smtp(false)).is_ok());
    }

    #[test]
    fn test_bad_from_address_rejected() {
        let mut config = smtp(false);
        config.from_address = "not an address".into();
        assert!(matches!(SmtpMailer::new(&config), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_password_not_in_debug() {
        assert!(!format!("{:?}", smtp(true)).contains("hunter2"));
    }
}
