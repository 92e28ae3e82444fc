//! Axum extractors for the authenticated principal and caller metadata.
//!
//! [`GateLayer`](crate::GateLayer) stores the [`Principal`] in the request
//! extensions; these extractors read it back out.
//!
//! # Usage
//!
//! ```ignore
//! use warden_axum::{ClientMeta, MaybeAuth, RequireAuth};
//!
//! // 401 if the gate did not grant a principal
//! async fn protected(auth: RequireAuth) -> String {
//!     format!("Hello, {}!", auth.username)
//! }
//!
//! // Public methods see None
//! async fn maybe(auth: MaybeAuth, client: ClientMeta) -> String {
//!     match auth.0 {
//!         Some(p) => format!("Hello, {} from {}!", p.username, client.ip()),
//!         None => "Hello, guest!".to_string(),
//!     }
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::ops::Deref;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use warden_auth_core::AuthError;
use warden_types::{ClientInfo, Principal};

use crate::error::ApiError;

/// Header naming the downstream service a login is for
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// Extension key for storing the principal in request extensions.
#[derive(Debug, Clone)]
pub struct PrincipalExt(pub Principal);

/// Extractor that requires an authenticated principal.
///
/// Returns 401 Unauthorized if the gate did not attach one.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Principal);

impl Deref for RequireAuth {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PrincipalExt>()
            .cloned()
            .map(|ext| Self(ext.0))
            .ok_or_else(|| AuthError::Unauthenticated("missing principal".into()).into())
    }
}

/// Extractor for an optional principal.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<Principal>);

impl Deref for MaybeAuth {
    type Target = Option<Principal>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<PrincipalExt>().cloned().map(|ext| ext.0)))
    }
}

/// Caller metadata for sessions and audit events.
///
/// The address comes from `X-Forwarded-For` (first hop), then `X-Real-IP`,
/// then the socket peer when the server was started with connect info.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientInfo);

impl Deref for ClientMeta {
    type Target = ClientInfo;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl ClientMeta {
    fn from_parts(parts: &Parts) -> Self {
        let forwarded = header_str(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
        let ip_address = forwarded
            .or_else(|| header_str(&parts.headers, "x-real-ip").map(String::from))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Self(ClientInfo {
            ip_address,
            user_agent: header_str(&parts.headers, USER_AGENT.as_str()).map(String::from),
            service_name: header_str(&parts.headers, SERVICE_NAME_HEADER).map(String::from),
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
