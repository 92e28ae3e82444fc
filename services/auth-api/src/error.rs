//! Error types for the Auth API service.

use axum::extract::FromRequest;

pub use warden_axum::ApiError;

/// JSON body extractor whose rejections use the API error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
