//! Warden Types - Shared domain types
//!
//! This crate contains domain types used across Warden crates:
//! - User identity and the credential state machine
//! - Sessions (one per refresh-token lineage)
//! - Authenticated principals and auth DTOs

pub mod auth;
pub mod error;
pub mod session;
pub mod user;

pub use auth::*;
pub use error::*;
pub use session::*;
pub use user::*;
