//! Common error types

use thiserror::Error;

/// Errors raised by entity state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserStateError {
    /// The account has been deactivated
    #[error("user account is inactive")]
    Inactive,

    /// The account is locked and the lockout window has not elapsed
    #[error("user account is locked")]
    Locked,

    /// A password hash was empty
    #[error("password hash cannot be empty")]
    EmptyPassword,

    /// A two-factor secret was empty
    #[error("two-factor secret cannot be empty")]
    EmptySecret,
}
