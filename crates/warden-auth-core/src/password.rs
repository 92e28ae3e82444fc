//! Password hashing and policy
//!
//! New hashes are Argon2id in PHC format:
//! `$argon2id$v=19$m=65536,t=3,p=2$<salt>$<hash>`. Stored bcrypt hashes
//! (`$2a$`, `$2b$`, `$2y$`) verify but are never produced.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordPolicy;
use crate::error::{AuthError, PolicyRule, PolicyViolation};

const ARGON2ID_PREFIX: &str = "$argon2id$";
const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Characters that satisfy the special-character rule
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Algorithm a stored hash was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Argon2id,
    Bcrypt,
    Unknown,
}

impl HashScheme {
    /// Detect the scheme from the encoded hash prefix
    pub fn detect(encoded: &str) -> Self {
        if encoded.starts_with(ARGON2ID_PREFIX) {
            Self::Argon2id
        } else if BCRYPT_PREFIXES.iter().any(|p| encoded.starts_with(p)) {
            Self::Bcrypt
        } else {
            Self::Unknown
        }
    }
}

/// Argon2id password hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    /// Memory cost in KiB (64 MiB)
    pub const MEMORY_KIB: u32 = 64 * 1024;
    pub const ITERATIONS: u32 = 3;
    pub const PARALLELISM: u32 = 2;
    /// Derived key length in bytes
    pub const KEY_LENGTH: usize = 32;

    #[must_use]
    pub fn new() -> Self {
        // Constant parameters inside Argon2's accepted ranges
        let params = Params::new(
            Self::MEMORY_KIB,
            Self::ITERATIONS,
            Self::PARALLELISM,
            Some(Self::KEY_LENGTH),
        )
        .expect("default Argon2id parameters are valid constants");

        Self { params }
    }

    /// Hasher with custom cost parameters
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(Self::KEY_LENGTH))
            .map_err(|e| AuthError::Configuration(format!("invalid Argon2 parameters: {e}")))?;

        Ok(Self { params })
    }

    /// Hash a password with a fresh 128-bit salt
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(error = %e, "Argon2id hashing failed");
                AuthError::Internal("password hashing failed".to_string())
            })?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash.
    ///
    /// Argon2id parameters are read from the encoded hash, so hashes made
    /// under older costs still verify. Unknown or malformed encodings
    /// never match.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        match HashScheme::detect(encoded) {
            HashScheme::Argon2id => {
                let Ok(parsed) = PasswordHash::new(encoded) else {
                    tracing::warn!("Stored Argon2id hash is malformed");
                    return false;
                };
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            }
            HashScheme::Bcrypt => bcrypt::verify(password, encoded).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored bcrypt hash is malformed");
                false
            }),
            HashScheme::Unknown => false,
        }
    }

    /// Hash on the blocking pool
    pub async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
    }

    /// Verify on the blocking pool
    pub async fn verify_blocking(&self, password: String, encoded: String) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))
    }
}

/// Check a candidate password against the policy.
///
/// Rules are checked in a fixed order and the first failure is returned.
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Result<(), AuthError> {
    let fail = |rule, message: String| Err(AuthError::Validation(PolicyViolation::new(rule, message)));

    if password.chars().count() < policy.min_length {
        return fail(
            PolicyRule::MinLength,
            format!("password must be at least {} characters", policy.min_length),
        );
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return fail(
            PolicyRule::Uppercase,
            "password must contain at least one uppercase letter".to_string(),
        );
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return fail(
            PolicyRule::Lowercase,
            "password must contain at least one lowercase letter".to_string(),
        );
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return fail(
            PolicyRule::Digit,
            "password must contain at least one number".to_string(),
        );
    }
    if policy.require_special && !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return fail(
            PolicyRule::Special,
            "password must contain at least one special character".to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::with_params(1024, 1, 1).unwrap()
    }

    fn rule_of(result: Result<(), AuthError>) -> Option<PolicyRule> {
        match result {
            Err(AuthError::Validation(v)) => Some(v.rule),
            _ => None,
        }
    }

    #[test]
    fn test_default_hash_format() {
        let hash = PasswordHasher::new().hash("Correct1").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=65536,t=3,p=2$"));
        assert_eq!(hash.split('$').count(), 6);
    }

    #[test]
    fn test_verify_roundtrip() {
        let hasher = fast();
        let hash = hasher.hash("Correct1").unwrap();
        assert!(hasher.verify("Correct1", &hash));
        assert!(!hasher.verify("Correct2", &hash));
    }

    #[test]
    fn test_verify_reads_params_from_hash() {
        let old = fast().hash("Correct1").unwrap();
        assert!(PasswordHasher::new().verify("Correct1", &old));
    }

    #[test]
    fn test_bcrypt_legacy_verify() {
        let legacy = bcrypt::hash("legacy-pass", 4).unwrap();
        assert_eq!(HashScheme::detect(&legacy), HashScheme::Bcrypt);
        assert!(fast().verify("legacy-pass", &legacy));
        assert!(!fast().verify("other", &legacy));
    }

    #[test]
    fn test_unknown_scheme_never_verifies() {
        assert!(!fast().verify("x", "plaintext"));
        assert!(!fast().verify("x", "$argon2id$garbage"));
        assert!(!fast().verify("", ""));
    }

    #[test]
    fn test_policy_rule_order() {
        let policy = PasswordPolicy {
            require_special: true,
            ..Default::default()
        };
        assert_eq!(rule_of(validate_password("short", &policy)), Some(PolicyRule::MinLength));
        assert_eq!(rule_of(validate_password("lowercase1", &policy)), Some(PolicyRule::Uppercase));
        assert_eq!(rule_of(validate_password("UPPERCASE1", &policy)), Some(PolicyRule::Lowercase));
        assert_eq!(rule_of(validate_password("NoDigitsHere", &policy)), Some(PolicyRule::Digit));
        assert_eq!(rule_of(validate_password("NoSpecial1", &policy)), Some(PolicyRule::Special));
        assert!(validate_password("Special1!", &policy).is_ok());
    }

    #[test]
    fn test_special_not_required_by_default() {
        assert!(validate_password("Password1", &PasswordPolicy::default()).is_ok());
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hasher = fast();
        let hash = hasher.hash_blocking("Correct1".into()).await.unwrap();
        assert!(hasher.verify_blocking("Correct1".into(), hash).await.unwrap());
    }
}
