//! HTTP handlers
//!
//! Every API route is `POST /<package>.<Service>/<Method>`, the same name the
//! authorization gate and throttle key on.

mod auth;
mod health;
mod session;

pub use auth::{
    disable_2fa, enable_2fa, forgot_password, get_current_user, login, logout, refresh_token,
    reset_password, update_password, verify_2fa, verify_reset_otp,
};
pub use health::{health, ready};
pub use session::{get_current_session, list_active_sessions, revoke_session};

/// Body for methods that return no data
#[derive(Debug, serde::Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

impl MessageResponse {
    pub fn ok(message: &'static str) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            message,
        })
    }
}
