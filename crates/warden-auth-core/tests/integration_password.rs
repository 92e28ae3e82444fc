//! Password reset and password change

mod common;

use std::time::Duration;

use common::{Harness, SentEmail, GOOD_PASSWORD};
use warden_auth_core::{AuthError, PolicyRule, SecurityConfig};

const NEW_PASSWORD: &str = "Brand2newpass";

#[tokio::test]
async fn test_forgot_password_same_response_for_unknown_email() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);

    let known = h.service.forgot_password("alice@example.com").await.unwrap();
    let unknown = h.service.forgot_password("nobody@example.com").await.unwrap();
    let malformed = h.service.forgot_password("not an email").await.unwrap();

    assert_eq!(known.otp_expires_in_secs, 300);
    assert_eq!(known, unknown);
    assert_eq!(known, malformed);
    assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_full_reset_flow() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);

    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    assert_eq!(otp.len(), 6);
    assert!(otp.bytes().all(|b| b.is_ascii_digit()));

    let reset = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();
    assert_eq!(reset.reset_token.len(), 64);
    assert_eq!(reset.expires_in_secs, 600);

    h.service
        .reset_password(&reset.reset_token, NEW_PASSWORD)
        .await
        .unwrap();
    let stored = h.users.get(user.id).unwrap();
    assert!(stored.password_changed_at.is_some());

    // Old password is gone, new one works
    let err = h
        .service
        .login(Harness::login_request("alice", GOOD_PASSWORD, ""), &Harness::client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    h.service
        .login(Harness::login_request("alice", NEW_PASSWORD, ""), &Harness::client())
        .await
        .unwrap();

    let actions = h.audit.actions_for(user.id);
    assert!(actions.contains(&"FORGOT_PASSWORD".to_string()));
    assert!(actions.contains(&"RESET_PASSWORD".to_string()));
}

#[tokio::test]
async fn test_otp_single_use_and_wrong_guess() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    let wrong = if otp == "000000" { "111111" } else { "000000" };

    let err = h
        .service
        .verify_reset_otp("alice@example.com", wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOtp));

    // A wrong guess does not burn the real code
    h.service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();
    let err = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOtp));
}

#[tokio::test(start_paused = true)]
async fn test_otp_expires() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();

    tokio::time::advance(SecurityConfig::default().otp_ttl + Duration::from_secs(1)).await;

    let err = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOtp));
}

#[tokio::test(start_paused = true)]
async fn test_reset_token_expires() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);
    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    let reset = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();

    tokio::time::advance(SecurityConfig::default().reset_token_ttl + Duration::from_secs(1)).await;

    let err = h
        .service
        .reset_password(&reset.reset_token, NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
    assert!(h.users.get(user.id).unwrap().password_changed_at.is_none());
}

#[tokio::test]
async fn test_verify_otp_for_unknown_email() {
    let h = Harness::new();
    let err = h
        .service
        .verify_reset_otp("nobody@example.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOtp));
}

#[tokio::test]
async fn test_reset_token_single_use() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    let reset = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();

    h.service
        .reset_password(&reset.reset_token, NEW_PASSWORD)
        .await
        .unwrap();
    let err = h
        .service
        .reset_password(&reset.reset_token, "Another3pass")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn test_weak_password_keeps_reset_token() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.service.forgot_password("alice@example.com").await.unwrap();
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    let reset = h
        .service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();

    let err = h
        .service
        .reset_password(&reset.reset_token, "weak")
        .await
        .unwrap_err();
    match err {
        AuthError::Validation(v) => assert_eq!(v.rule, PolicyRule::MinLength),
        other => panic!("unexpected error: {other:?}"),
    }

    // Policy is checked before the token is spent
    h.service
        .reset_password(&reset.reset_token, NEW_PASSWORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mail_failure_does_not_fail_forgot_password() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.mailer.fail_sends(true);

    h.service.forgot_password("alice@example.com").await.unwrap();
    assert!(matches!(h.mailer.sent().as_slice(), [SentEmail::Otp { .. }]));
}

#[tokio::test(start_paused = true)]
async fn test_hung_mail_server_does_not_stall_forgot_password() {
    let h = Harness::new();
    h.seed_user("alice", GOOD_PASSWORD);
    h.mailer.hang_sends(true);

    let result = h.service.forgot_password("alice@example.com").await.unwrap();
    assert_eq!(result.otp_expires_in_secs, 300);

    // The OTP was stored before the send stalled
    let otp = h.mailer.last_otp("alice@example.com").unwrap();
    h.service
        .verify_reset_otp("alice@example.com", &otp)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_password() {
    let h = Harness::new();
    let user = h.seed_user("alice", GOOD_PASSWORD);

    let err = h
        .service
        .update_password(user.id, "Wrong1pass", NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = h
        .service
        .update_password(user.id, GOOD_PASSWORD, "nouppercase1")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(ref v) if v.rule == PolicyRule::Uppercase));

    h.service
        .update_password(user.id, GOOD_PASSWORD, NEW_PASSWORD)
        .await
        .unwrap();
    h.service
        .login(Harness::login_request("alice", NEW_PASSWORD, ""), &Harness::client())
        .await
        .unwrap();
    assert!(h
        .audit
        .actions_for(user.id)
        .contains(&"CHANGE_PASSWORD".to_string()));
}

#[tokio::test]
async fn test_update_password_unknown_user() {
    let h = Harness::new();
    let err = h
        .service
        .update_password(warden_types::UserId::new(), GOOD_PASSWORD, NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}
