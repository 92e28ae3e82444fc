//! Session management and behavior during a cache outage

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Harness, OutageCache, GOOD_PASSWORD};
use warden_auth_core::{AuthError, BreakerConfig, BreakerState, CircuitBreaker, GuardedCache};
use warden_types::{ListSessionsParams, Session, SessionSortField, SortOrder};

async fn login(h: &Harness, username: &str) -> warden_types::TokenPair {
    h.service
        .login(Harness::login_request(username, GOOD_PASSWORD, ""), &Harness::client())
        .await
        .unwrap()
        .tokens
}

// ============================================================================
// Session operations
// ============================================================================

#[tokio::test]
async fn test_current_session() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);

    let err = h.service.current_session(user.id).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));

    login(&h, "alice").await;
    let session = h.service.current_session(user.id).await.unwrap();
    assert_eq!(session.user_id, user.id);
    assert_eq!(session.device_info.as_deref(), Some("integration-test"));
    assert!(h.cache.cached_session(session.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_revoke_session_ends_refresh_lineage() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);
    let pair = login(&h, "alice").await;
    let session = h.service.current_session(user.id).await.unwrap();

    h.service.revoke_session(session.id).await.unwrap();
    assert!(h.cache.cached_session(session.id).await.unwrap().is_none());

    let err = h
        .service
        .refresh_token(&pair.refresh_token, &Harness::client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_revoke_unknown_session() {
    let h = Harness::new();
    let err = h
        .service
        .revoke_session(warden_types::SessionId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}

#[tokio::test]
async fn test_revoke_user_sessions() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);
    login(&h, "alice").await;

    assert_eq!(h.service.revoke_user_sessions(user.id).await.unwrap(), 1);
    assert_eq!(h.service.revoke_user_sessions(user.id).await.unwrap(), 0);
    assert!(h.sessions.unrevoked_for(user.id).is_empty());
}

#[tokio::test]
async fn test_list_active_sessions() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.seed_user("bob", GOOD_PASSWORD);
    h.seed_user("carol", GOOD_PASSWORD);
    for name in ["alice", "bob", "carol"] {
        login(&h, name).await;
    }

    let (all, total) = h
        .service
        .list_active_sessions(&ListSessionsParams::default())
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 3);

    let params = ListSessionsParams {
        search: Some("BOB".into()),
        ..ListSessionsParams::default()
    };
    let (found, total) = h.service.list_active_sessions(&params).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].username, "bob");
    assert_eq!(found[0].email, "bob@example.com");

    let params = ListSessionsParams {
        page: 2,
        page_size: 2,
        sort_by: SessionSortField::Username,
        sort_order: SortOrder::Asc,
        ..ListSessionsParams::default()
    };
    let (page, total) = h.service.list_active_sessions(&params).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].username, "carol");
}

#[tokio::test]
async fn test_cleanup_expired_sessions() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);
    login(&h, "alice").await;
    h.sessions
        .insert_session(Session::new(user.id, "stale-hash", Utc::now() - chrono::Duration::hours(1)));
    assert_eq!(h.sessions.len(), 2);

    assert_eq!(h.service.cleanup_expired_sessions().await.unwrap(), 1);
    assert_eq!(h.sessions.len(), 1);
    assert_eq!(h.service.cleanup_expired_sessions().await.unwrap(), 0);
}

// ============================================================================
// Cache outage
// ============================================================================

#[tokio::test]
async fn test_login_and_refresh_survive_cache_outage() {
    let outage = OutageCache::default();
    let h = Harness::with_backend(Arc::new(outage.clone()));
    let user = h.seed_user("alice", GOOD_PASSWORD);
    outage.set_down(true);

    let pair = login(&h, "alice").await;
    let rotated = h
        .service
        .refresh_token(&pair.refresh_token, &Harness::client())
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);
    assert_eq!(h.sessions.unrevoked_for(user.id).len(), 1);

    // Blacklist lookups fail open at the gate too
    let header = format!("Bearer {}", rotated.access_token);
    h.service
        .gate()
        .check("/iam.v1.AuthService/GetCurrentUser", Some(&header))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_password_still_checked_during_outage() {
    let outage = OutageCache::default();
    let h = Harness::with_backend(Arc::new(outage.clone()));
    h.seed_user("alice", GOOD_PASSWORD);
    outage.set_down(true);

    let err = h
        .service
        .login(Harness::login_request("alice", "Wrong1pass", ""), &Harness::client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_security_state_writes_fail_closed() {
    let outage = OutageCache::default();
    let h = Harness::with_backend(Arc::new(outage.clone()));
    let user = h.seed_user("alice", GOOD_PASSWORD);
    outage.set_down(true);

    let err = h.service.forgot_password("alice@example.com").await.unwrap_err();
    assert!(matches!(err, AuthError::Cache(_)));
    assert!(h.mailer.sent().is_empty());

    let err = h.service.enable_2fa(user.id).await.unwrap_err();
    assert!(matches!(err, AuthError::Cache(_)));

    let err = h
        .service
        .verify_reset_otp("alice@example.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Cache(_)));
}

#[tokio::test]
async fn test_breaker_opens_without_blocking_login() {
    let outage = OutageCache::default();
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        max_failures: 2,
        timeout: Duration::from_secs(60),
        ..BreakerConfig::new("cache")
    }));
    let guarded = Arc::new(GuardedCache::new(outage.clone(), Arc::clone(&breaker)));
    let h = Harness::with_backend(guarded);
    h.seed_user("alice", GOOD_PASSWORD);
    outage.set_down(true);

    login(&h, "alice").await;
    assert_eq!(breaker.state(), BreakerState::Open);

    // Open circuit short-circuits but login keeps working
    outage.set_down(false);
    login(&h, "alice").await;
    assert_eq!(breaker.state(), BreakerState::Open);
}
