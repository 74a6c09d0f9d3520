mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{
    PASSWORD, create_test_app, create_test_app_with, create_test_app_with_limits, relaxed_limits,
};
use latchkey::{
    db::UserRole,
    flows::RESET_REQUESTED_MESSAGE,
    jwt::{Claims, RESET_TOKEN_TTL},
    rate_limit::RateLimitSettings,
};
use serde_json::json;

// --- Health ---

#[tokio::test]
async fn test_health() {
    let t = create_test_app().await;
    let (status, body) = t.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

// --- Registration ---

#[tokio::test]
async fn test_register_sends_verification_email() {
    let t = create_test_app().await;

    let (status, body) = t
        .post(
            "/auth/register",
            json!({ "email": " Alice@Example.com ", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["message"].is_string());

    let message = t.notifier.last_to("alice@example.com").unwrap();
    assert_eq!(message.subject, "Verify your email");
    assert!(
        message
            .html_body
            .contains("http://localhost:3000/verify-email?token=")
    );

    let user = t
        .db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.role, UserRole::User);
    assert!(!user.verified);
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let t = create_test_app().await;
    assert_eq!(t.register("alice@example.com").await, StatusCode::CREATED);

    let (status, body) = t
        .post(
            "/auth/register",
            json!({ "email": "ALICE@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn test_register_validates_input() {
    let t = create_test_app().await;

    let cases = [
        json!({ "email": "not-an-email", "password": PASSWORD }),
        json!({ "email": "alice@example.com", "password": "short" }),
        json!({ "email": "alice@example.com", "password": "x".repeat(73) }),
    ];
    for case in cases {
        let (status, body) = t.post("/auth/register", case).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    assert!(t.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_register_succeeds_when_verification_link_cannot_be_built() {
    let app_url = url::Url::parse("mailto:ops@example.com").unwrap();
    let t = create_test_app_with(relaxed_limits(), app_url).await;

    assert_eq!(t.register("alice@example.com").await, StatusCode::CREATED);
    assert!(t.notifier.messages().is_empty());

    let user = t
        .db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap();
    assert!(user.is_some());

    // The account is usable even though no email went out.
    t.login("alice@example.com", PASSWORD).await;
}

// --- Login ---

#[tokio::test]
async fn test_login_returns_bearer_pair() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;

    let (status, body) = t
        .post(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");

    let access = body["access_token"].as_str().unwrap();
    let refresh = body["refresh_token"].as_str().unwrap();
    assert!(matches!(t.codec.decode(access), Some(Claims::Access { .. })));
    assert!(matches!(t.codec.decode(refresh), Some(Claims::Refresh { .. })));
}

#[tokio::test]
async fn test_login_failures_look_identical() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;

    let wrong_password = t
        .post(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": "wrong-password" }),
        )
        .await;
    let unknown_email = t
        .post(
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": PASSWORD }),
        )
        .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
}

// --- Refresh and logout ---

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let (_, r0) = t.login("alice@example.com", PASSWORD).await;

    let (status, body) = t
        .post("/auth/refresh", json!({ "refresh_token": r0 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    let r1 = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(r1, r0);

    let (status, body) = t
        .post("/auth/refresh", json!({ "refresh_token": r0 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = t
        .post("/auth/refresh", json!({ "refresh_token": r1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rejects_garbage() {
    let t = create_test_app().await;
    let (status, _) = t
        .post("/auth/refresh", json!({ "refresh_token": "garbage" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let (access, refresh) = t.login("alice@example.com", PASSWORD).await;

    let (status, body) = t
        .post("/auth/logout", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out");

    // Repeating is fine
    let (status, _) = t
        .post("/auth/logout", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .post("/auth/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Stateless access token outlives the session
    let (status, _) = t.get("/users/me", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
}

// --- Email verification ---

#[tokio::test]
async fn test_verify_email_link() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let token = t.mailed_token("alice@example.com");

    let (status, body) = t
        .get(&format!("/auth/verify-email?token={}", token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email verified");

    let (access, _) = t.login("alice@example.com", PASSWORD).await;
    let (_, me) = t.get("/users/me", Some(&access)).await;
    assert_eq!(me["verified"], true);
}

#[tokio::test]
async fn test_verify_email_rejects_bad_tokens() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com", PASSWORD).await;

    for token in ["garbage".to_string(), refresh] {
        let (status, body) = t
            .get(&format!("/auth/verify-email?token={}", token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid or expired token");
    }
}

#[tokio::test]
async fn test_verify_email_for_deleted_account() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let token = t.mailed_token("alice@example.com");

    let user = t
        .db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    t.db.users().delete(user.id).await.unwrap();

    let (status, _) = t
        .get(&format!("/auth/verify-email?token={}", token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Password reset ---

#[tokio::test]
async fn test_password_reset_flow() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;

    let (status, body) = t
        .post(
            "/auth/request-password-reset",
            json!({ "email": "alice@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], RESET_REQUESTED_MESSAGE);

    let message = t.notifier.last_to("alice@example.com").unwrap();
    assert_eq!(message.subject, "Password reset");
    let token = t.mailed_token("alice@example.com");

    let (status, _) = t
        .post(
            "/auth/reset-password",
            json!({ "token": token, "password": "brand-new-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .post(
            "/auth/login",
            json!({ "email": "alice@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    t.login("alice@example.com", "brand-new-password").await;
}

#[tokio::test]
async fn test_password_reset_request_does_not_enumerate() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let sent_before = t.notifier.messages().len();

    let existing = t
        .post(
            "/auth/request-password-reset",
            json!({ "email": "alice@example.com" }),
        )
        .await;
    let missing = t
        .post(
            "/auth/request-password-reset",
            json!({ "email": "nobody@example.com" }),
        )
        .await;

    assert_eq!(existing, missing);
    assert_eq!(t.notifier.messages().len(), sent_before + 1);
}

#[tokio::test]
async fn test_reset_password_rejects_wrong_token_kind() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let verify_token = t.mailed_token("alice@example.com");

    let (status, body) = t
        .post(
            "/auth/reset-password",
            json!({ "token": verify_token, "password": "brand-new-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_reset_password_for_deleted_account() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let token = t
        .codec
        .mint(
            &Claims::Reset {
                sub: "alice@example.com".to_string(),
            },
            RESET_TOKEN_TTL,
        )
        .unwrap();

    let user = t
        .db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    t.db.users().delete(user.id).await.unwrap();

    let (status, body) = t
        .post(
            "/auth/reset-password",
            json!({ "token": token, "password": "brand-new-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid token");
}

// --- Current identity ---

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let t = create_test_app().await;

    let response_status = t.get("/users/me", None).await.0;
    assert_eq!(response_status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.get("/users/me", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn test_me_rejects_refresh_token_as_bearer() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let (_, refresh) = t.login("alice@example.com", PASSWORD).await;

    let (status, body) = t.get("/users/me", Some(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn test_me_returns_profile() {
    let t = create_test_app().await;
    t.register("alice@example.com").await;
    let (access, _) = t.login("alice@example.com", PASSWORD).await;

    let (status, body) = t.get("/users/me", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "user");
    assert_eq!(body["verified"], false);
    assert!(body["id"].is_i64());
    assert!(body["created_at"].is_string());
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_unauthenticated_response_has_challenge_header() {
    let t = create_test_app().await;
    let response = tower::ServiceExt::oneshot(
        t.app.clone(),
        Request::builder()
            .method("GET")
            .uri("/users/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
}

// --- Admin ---

async fn admin_and_user(t: &common::TestApp) -> (String, String, i64) {
    t.register("admin@example.com").await;
    t.register("bob@example.com").await;
    let admin = t
        .db
        .users()
        .get_by_email("admin@example.com")
        .await
        .unwrap()
        .unwrap();
    t.db.users().set_role(admin.id, UserRole::Admin).await.unwrap();
    let bob = t
        .db
        .users()
        .get_by_email("bob@example.com")
        .await
        .unwrap()
        .unwrap();

    let (admin_access, _) = t.login("admin@example.com", PASSWORD).await;
    let (user_access, _) = t.login("bob@example.com", PASSWORD).await;
    (admin_access, user_access, bob.id)
}

#[tokio::test]
async fn test_list_users_requires_admin() {
    let t = create_test_app().await;
    let (admin, user, _) = admin_and_user(&t).await;

    let (status, body) = t.get("/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions");

    let (status, body) = t.get("/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["email"], "admin@example.com");
    assert_eq!(users[0]["role"], "admin");
    assert_eq!(users[1]["active"], true);
}

#[tokio::test]
async fn test_promote_and_demote() {
    let t = create_test_app().await;
    let (admin, user, bob_id) = admin_and_user(&t).await;

    let (status, _) = t
        .post_empty(&format!("/users/promote/{}", bob_id), Some(&user))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .post_empty(&format!("/users/promote/{}", bob_id), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    // Bob's existing token now carries admin rights
    let (status, _) = t.get("/users", Some(&user)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .post_empty(&format!("/users/demote/{}", bob_id), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.get("/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_promote_unknown_user_is_not_found() {
    let t = create_test_app().await;
    let (admin, _, _) = admin_and_user(&t).await;

    let (status, body) = t.post_empty("/users/promote/9999", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, _) = t.post_empty("/users/demote/9999", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Rate limiting ---

#[tokio::test]
async fn test_login_rate_limit() {
    let t = create_test_app_with_limits(RateLimitSettings {
        login_per_minute: 2,
        register_per_minute: 100,
        trust_forwarded_for: true,
    })
    .await;
    t.register("alice@example.com").await;

    let body = json!({ "email": "alice@example.com", "password": "wrong-password" });
    for _ in 0..2 {
        let (status, _) = t.post("/auth/login", body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = t.post("/auth/login", body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Other endpoints are unaffected
    let (status, _) = t.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_rate_limit_is_per_ip() {
    let t = create_test_app_with_limits(RateLimitSettings {
        login_per_minute: 100,
        register_per_minute: 1,
        trust_forwarded_for: true,
    })
    .await;

    assert_eq!(t.register("a@example.com").await, StatusCode::CREATED);
    assert_eq!(t.register("b@example.com").await, StatusCode::TOO_MANY_REQUESTS);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.20")
        .body(Body::from(
            json!({ "email": "c@example.com", "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    let (status, _) = t.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
}
