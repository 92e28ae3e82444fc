//! Session handlers (`/iam.v1.SessionService/*`)

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_axum::{ApiError, RequireAuth};
use warden_types::{ListSessionsParams, Session, SessionId, SessionInfo};

use super::MessageResponse;
use crate::error::{ApiJson, ApiResult};
use crate::state::AppState;

/// Session as shown to its owner; the refresh-token hash never leaves storage
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub service_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            device_info: session.device_info,
            ip_address: session.ip_address,
            service_name: session.service_name,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionInfo>,
    pub pagination: Pagination,
}

fn pagination(params: &ListSessionsParams, total_items: u64) -> Pagination {
    let page_size = params.limit();
    Pagination {
        page: params.page(),
        page_size,
        total_items,
        total_pages: total_items.div_ceil(u64::from(page_size)),
    }
}

/// POST /iam.v1.SessionService/GetCurrentSession
pub async fn get_current_session(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.auth.current_session(auth.user_id).await?;
    Ok(Json(session.into()))
}

/// POST /iam.v1.SessionService/RevokeSession
pub async fn revoke_session(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(req): ApiJson<RevokeSessionRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let session_id = SessionId::parse(&req.session_id)
        .map_err(|_| ApiError::BadRequest("session_id must be a UUID".into()))?;

    state.auth.revoke_session(session_id).await?;
    tracing::info!(%session_id, revoked_by = %auth.user_id, "Session revoked");
    Ok(MessageResponse::ok("session revoked successfully"))
}

/// POST /iam.v1.SessionService/ListActiveSessions
pub async fn list_active_sessions(
    State(state): State<AppState>,
    ApiJson(params): ApiJson<ListSessionsParams>,
) -> ApiResult<Json<ListSessionsResponse>> {
    let (sessions, total) = state.auth.list_active_sessions(&params).await?;
    Ok(Json(ListSessionsResponse {
        sessions,
        pagination: pagination(&params, total),
    }))
}
