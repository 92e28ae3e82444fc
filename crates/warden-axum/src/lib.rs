//! Warden Axum Integration
//!
//! Axum middleware and extractors that put the [`AuthorizationGate`] in
//! front of an axum `Router`.
//!
//! # Overview
//!
//! - **Middleware**: [`GateLayer`] authenticates and authorizes every call
//!   by its path, which is the fully-qualified RPC method name
//!   (`/iam.v1.AuthService/Login`)
//! - **Throttling**: [`ThrottleLayer`] applies a global token bucket plus
//!   tighter per-method quotas
//! - **Extractors**: [`RequireAuth`], [`MaybeAuth`], [`ClientMeta`]
//! - **Errors**: [`ApiError`] renders every failure as a JSON envelope
//!
//! # Quick Start
//!
//! ```ignore
//! use warden_axum::{GateLayer, RequireAuth};
//! use axum::{Router, routing::post};
//!
//! async fn current_user(auth: RequireAuth) -> String {
//!     format!("Hello, {}!", auth.username)
//! }
//!
//! let app = Router::new()
//!     .route("/iam.v1.AuthService/GetCurrentUser", post(current_user))
//!     .layer(GateLayer::new(service.gate()));
//! ```
//!
//! [`AuthorizationGate`]: warden_auth_core::AuthorizationGate

pub mod error;
pub mod extractors;
pub mod layer;
pub mod rate_limit;

pub use error::{ApiError, ErrorDetail, ErrorResponse};
pub use extractors::{ClientMeta, MaybeAuth, PrincipalExt, RequireAuth};
pub use layer::{GateLayer, GateService};
pub use rate_limit::{MethodThrottle, ThrottleLayer, ThrottleService};
