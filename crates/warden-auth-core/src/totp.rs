//! TOTP (RFC 6238) generation and validation

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use url::Url;

use crate::config::TotpConfig;
use crate::crypto::constant_time_str_eq;
use crate::AuthError;

type HmacSha1 = Hmac<Sha1>;

/// Secret size in bytes (160 bits)
pub const SECRET_BYTES: usize = 20;

/// TOTP engine bound to one set of parameters
#[derive(Debug, Clone)]
pub struct TotpEngine {
    config: TotpConfig,
}

impl TotpEngine {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Fresh random secret, Base32 without padding
    pub fn generate_secret(&self) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        BASE32_NOPAD.encode(&bytes)
    }

    /// `otpauth://` URI for authenticator enrollment
    pub fn provisioning_uri(&self, secret: &str, account: &str) -> Result<String, AuthError> {
        let label = format!("{}:{}", self.config.issuer, account);
        let mut url = Url::parse("otpauth://totp/")
            .map_err(|e| AuthError::Internal(format!("otpauth base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| AuthError::Internal("otpauth URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(&label);
        url.query_pairs_mut()
            .append_pair("secret", secret)
            .append_pair("issuer", &self.config.issuer)
            .append_pair("algorithm", "SHA1")
            .append_pair("digits", &self.config.digits.to_string())
            .append_pair("period", &self.config.period_secs.to_string());

        Ok(url.into())
    }

    /// Code for the period containing `unix_time`
    pub fn generate_at(&self, secret: &str, unix_time: u64) -> Result<String, AuthError> {
        let key = decode_secret(secret)?;
        Ok(self.code_for_counter(&key, unix_time / self.config.period_secs))
    }

    /// Validate against the current clock
    pub fn validate(&self, secret: &str, code: &str) -> bool {
        self.validate_at(secret, code, chrono::Utc::now().timestamp().max(0) as u64)
    }

    /// Validate `code` for the period containing `unix_time` and `skew`
    /// periods either side
    pub fn validate_at(&self, secret: &str, code: &str, unix_time: u64) -> bool {
        if code.len() != self.config.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let Ok(key) = decode_secret(secret) else {
            return false;
        };

        let current = unix_time / self.config.period_secs;
        let skew = u64::from(self.config.skew);
        let mut matched = false;
        for counter in current.saturating_sub(skew)..=current.saturating_add(skew) {
            // No early exit; every candidate is compared
            matched |= constant_time_str_eq(&self.code_for_counter(&key, counter), code);
        }
        matched
    }

    fn code_for_counter(&self, key: &[u8], counter: u64) -> String {
        let mut mac = match HmacSha1::new_from_slice(key) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = usize::from(digest[digest.len() - 1] & 0x0f);
        let binary = (u32::from(digest[offset] & 0x7f) << 24)
            | (u32::from(digest[offset + 1]) << 16)
            | (u32::from(digest[offset + 2]) << 8)
            | u32::from(digest[offset + 3]);

        let modulus = 10u32.pow(self.config.digits);
        format!(
            "{:0width$}",
            binary % modulus,
            width = self.config.digits as usize
        )
    }
}

/// Decode a Base32 secret, tolerating lowercase and stray padding
fn decode_secret(secret: &str) -> Result<Vec<u8>, AuthError> {
    let normalized: String = secret
        .trim_end_matches('=')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| AuthError::Internal("invalid TOTP secret encoding".to_string()))
}
