//! Authentication handlers (`/iam.v1.AuthService/*`)

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_axum::{ClientMeta, RequireAuth};
use warden_types::{LoginRequest, LoginResult, ResetTokenResult, TokenPair, TwoFactorSetup, UserInfo};

use super::MessageResponse;
use crate::error::{ApiJson, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub message: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetOtpRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct Verify2faRequest {
    pub totp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct Disable2faRequest {
    pub password: String,
    /// TOTP code or an unused recovery code
    pub verification_code: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /iam.v1.AuthService/Login
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResult>> {
    let result = state.auth.login(req, &client).await?;
    Ok(Json(result))
}

/// POST /iam.v1.AuthService/Logout
pub async fn logout(
    State(state): State<AppState>,
    client: ClientMeta,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth.logout(&req.refresh_token, &client).await?;
    Ok(MessageResponse::ok("logout successful"))
}

/// POST /iam.v1.AuthService/RefreshToken
pub async fn refresh_token(
    State(state): State<AppState>,
    client: ClientMeta,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> ApiResult<Json<TokenPair>> {
    let pair = state.auth.refresh_token(&req.refresh_token, &client).await?;
    Ok(Json(pair))
}

/// POST /iam.v1.AuthService/ForgotPassword
///
/// Answers identically for known, unknown and malformed emails; failures
/// are logged only.
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Json<ForgotPasswordResponse> {
    let expires_in = match state.auth.forgot_password(&req.email).await {
        Ok(result) => result.otp_expires_in_secs,
        Err(e) => {
            tracing::warn!(error = %e, "Password reset request failed");
            state.config.auth.security.otp_ttl.as_secs()
        }
    };

    Json(ForgotPasswordResponse {
        success: true,
        message: "If the email is registered, an OTP has been sent",
        expires_in,
    })
}

/// POST /iam.v1.AuthService/VerifyResetOTP
pub async fn verify_reset_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyResetOtpRequest>,
) -> ApiResult<Json<ResetTokenResult>> {
    let result = state.auth.verify_reset_otp(&req.email, &req.otp_code).await?;
    Ok(Json(result))
}

/// POST /iam.v1.AuthService/ResetPassword
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth.reset_password(&req.reset_token, &req.new_password).await?;
    Ok(MessageResponse::ok("password reset successful"))
}

/// POST /iam.v1.AuthService/UpdatePassword
pub async fn update_password(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .auth
        .update_password(auth.user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(MessageResponse::ok("password updated successfully"))
}

/// POST /iam.v1.AuthService/Enable2FA
pub async fn enable_2fa(State(state): State<AppState>, auth: RequireAuth) -> ApiResult<Json<TwoFactorSetup>> {
    let setup = state.auth.enable_2fa(auth.user_id).await?;
    Ok(Json(setup))
}

/// POST /iam.v1.AuthService/Verify2FA
pub async fn verify_2fa(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(req): ApiJson<Verify2faRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth.verify_2fa(auth.user_id, &req.totp_code).await?;
    Ok(MessageResponse::ok("2FA enabled successfully"))
}

/// POST /iam.v1.AuthService/Disable2FA
pub async fn disable_2fa(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(req): ApiJson<Disable2faRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .auth
        .disable_2fa(auth.user_id, &req.password, &req.verification_code)
        .await?;
    Ok(MessageResponse::ok("2FA disabled successfully"))
}

/// POST /iam.v1.AuthService/GetCurrentUser
pub async fn get_current_user(State(state): State<AppState>, auth: RequireAuth) -> ApiResult<Json<UserInfo>> {
    let user = state.auth.current_user(&auth).await?;
    Ok(Json(user))
}
