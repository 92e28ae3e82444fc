//! Error types for the gate middleware, throttle and extractors.
//!
//! Every failure leaves the process as the same JSON envelope:
//!
//! ```json
//! { "error": { "code": "UNAUTHENTICATED", "message": "invalid credentials" } }
//! ```

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use warden_auth_core::{AuthError, ErrorKind};

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Errors surfaced over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Any orchestrator or gate failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Request throttled.
    #[error("rate limit exceeded: retry after {retry_after_secs} seconds")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Body could not be decoded
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Create a rate limit exceeded error.
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimitExceeded { retry_after_secs }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.public_code(),
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }

    fn body(&self) -> ErrorDetail {
        let (message, details) = match self {
            Self::Auth(AuthError::Validation(v)) => (
                v.message.clone(),
                Some(serde_json::json!({ "field": v.field, "rule": v.rule.as_str() })),
            ),
            Self::Auth(e) => (e.public_message(), None),
            other => (other.to_string(), None),
        };

        ErrorDetail {
            code: self.error_code().to_string(),
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Auth(e) = &self {
            if e.kind() == ErrorKind::Infrastructure {
                tracing::error!(error = %e, "Request failed on a dependency");
            }
        }

        let status = self.status_code();
        let body = Json(ErrorResponse { error: self.body() });
        let mut response = (status, body).into_response();

        if let Self::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::rate_limited(60);
        assert!(err.to_string().contains("60 seconds"));

        let err = ApiError::from(AuthError::AccountLocked);
        assert_eq!(err.to_string(), "account is temporarily locked");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::from(AuthError::AccountLocked).status_code(), StatusCode::LOCKED);
        assert_eq!(
            ApiError::from(AuthError::PermissionDenied("x".into())).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::Cache("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::rate_limited(1).status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = ApiError::rate_limited(3).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");

        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_infrastructure_detail_is_hidden() {
        let response = ApiError::from(AuthError::Database("connection reset by peer".into())).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"]["message"], "internal error");
    }

    #[tokio::test]
    async fn test_credential_failures_are_indistinguishable() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountInactive,
            AuthError::InvalidToken,
            AuthError::TokenRevoked,
            AuthError::SessionNotFound,
            AuthError::Unauthenticated("missing authorization header".into()),
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "UNAUTHENTICATED");
            assert_eq!(json["error"]["message"], "invalid credentials");
        }
    }

    #[tokio::test]
    async fn test_dependency_failures_share_a_code() {
        for err in [AuthError::Cache("redis timeout".into()), AuthError::Database("pool closed".into())] {
            let json = body_json(ApiError::from(err).into_response()).await;
            assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        }
    }

    #[tokio::test]
    async fn test_flow_errors_keep_their_code() {
        let json = body_json(ApiError::from(AuthError::TwoFactorRequired).into_response()).await;
        assert_eq!(json["error"]["code"], "TWO_FACTOR_REQUIRED");

        let json = body_json(ApiError::from(AuthError::TokenExpired).into_response()).await;
        assert_eq!(json["error"]["code"], "TOKEN_EXPIRED");
    }
}
