//! JWT issuing and validation
//!
//! Access and refresh tokens are both HS256, signed with distinct secrets so
//! a leaked access secret cannot mint refresh tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_types::{Principal, UserId};

use crate::config::TokenConfig;
use crate::AuthError;

/// Which secret and lifetime a token was minted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Claims carried by both token types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Unique token id
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Claims {
    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    /// Seconds until expiry, floored at `floor`
    pub fn remaining_secs(&self, floor: u64) -> u64 {
        let remaining = self.exp - Utc::now().timestamp();
        u64::try_from(remaining).unwrap_or(0).max(floor)
    }

    /// Principal built from the claims alone
    pub fn into_principal(self) -> Principal {
        Principal {
            user_id: self.user_id,
            username: self.username,
            email: self.email,
            roles: self.roles,
            permissions: self.permissions,
            token_id: self.jti,
        }
    }
}

/// Identity to embed in a new token pair
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: UserId,
    pub username: &'a str,
    pub email: &'a str,
    pub roles: &'a [String],
    pub permissions: &'a [String],
}

/// Freshly minted access and refresh tokens
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Session correlation key
    pub refresh_jti: String,
    pub refresh_expires_at: DateTime<Utc>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 token issuer and validator
pub struct TokenIssuer {
    access: Keys,
    refresh: Keys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    validation: Validation,
}

impl TokenIssuer {
    /// Build an issuer; rejects short or shared secrets
    pub fn new(config: &TokenConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let to_chrono = |d: std::time::Duration| {
            Duration::from_std(d)
                .map_err(|e| AuthError::Configuration(format!("token TTL out of range: {e}")))
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            access: Keys::from_secret(&config.access_secret),
            refresh: Keys::from_secret(&config.refresh_secret),
            access_ttl: to_chrono(config.access_ttl)?,
            refresh_ttl: to_chrono(config.refresh_ttl)?,
            issuer: config.issuer.clone(),
            validation,
        })
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> u64 {
        u64::try_from(self.access_ttl.num_seconds()).unwrap_or(0)
    }

    /// Mint an access and a refresh token for `subject`
    pub fn generate_pair(&self, subject: TokenSubject<'_>) -> Result<IssuedTokens, AuthError> {
        let now = Utc::now();
        let (access_token, _) = self.sign(TokenType::Access, &subject, now)?;
        let (refresh_token, refresh_claims) = self.sign(TokenType::Refresh, &subject, now)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs(),
            refresh_expires_at: refresh_claims.expires_at(),
            refresh_jti: refresh_claims.jti,
        })
    }

    fn sign(
        &self,
        token_type: TokenType,
        subject: &TokenSubject<'_>,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), AuthError> {
        let (keys, ttl) = match token_type {
            TokenType::Access => (&self.access, self.access_ttl),
            TokenType::Refresh => (&self.refresh, self.refresh_ttl),
        };

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
            user_id: subject.user_id,
            username: subject.username.to_string(),
            email: subject.email.to_string(),
            roles: subject.roles.to_vec(),
            permissions: subject.permissions.to_vec(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| {
            tracing::error!(error = %e, token_type = token_type.as_str(), "Failed to sign token");
            AuthError::Internal("failed to sign token".to_string())
        })?;

        Ok((token, claims))
    }

    /// Validate an access token
    pub fn validate_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, TokenType::Access)
    }

    /// Validate a refresh token
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate(token, TokenType::Refresh)
    }

    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let keys = match expected {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        };

        let data = decode::<Claims>(token, &keys.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Token validation failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        if data.claims.token_type != expected {
            tracing::debug!(
                expected = expected.as_str(),
                actual = data.claims.token_type.as_str(),
                "Token type mismatch"
            );
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}
