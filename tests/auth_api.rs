mod common;

use actix_web::{http::StatusCode, test, web, App};
use chrono::Duration;
use serde_json::json;
use stories_server::configure;

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .wrap($state.access_gate())
                .configure(configure),
        )
        .await
    };
}

#[test_log::test(actix_web::test)]
async fn test_register_login_and_session() {
    let store = common::MemoryStore::new();
    let state = common::test_state(store.clone());
    let app = init_app!(state);

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "email": "alice@example.com",
            "username": "alice",
            "password": "wonderland1"
        }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let user: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(user["email"], "alice@example.com");
    assert!(user.get("hashed_password").is_none());

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_form([("username", "alice@example.com"), ("password", "wonderland1")])
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(token["token_type"], "bearer");
    let access_token = token["access_token"].as_str().unwrap().to_string();

    let resp = test::TestRequest::get()
        .uri("/api/v1/auth/session")
        .insert_header(("Authorization", format!("Bearer {}", access_token)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "valid");
    assert_eq!(body["user_id"], user["id"]);

    let resp = test::TestRequest::get()
        .uri("/api/v1/auth/check-session")
        .insert_header(("Authorization", format!("Bearer {}", access_token)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["username"], "alice");
}

#[actix_web::test]
async fn test_duplicate_registration_rejected() {
    let store = common::MemoryStore::new();
    common::seed_user(&store, "alice@example.com", "alice").await;
    let state = common::test_state(store);
    let app = init_app!(state);

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .set_json(json!({
            "email": "other@example.com",
            "username": "alice",
            "password": "wonderland1"
        }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Email or username already registered");
}

#[actix_web::test]
async fn test_login_with_wrong_password() {
    let store = common::MemoryStore::new();
    common::seed_user(&store, "alice@example.com", "alice").await;
    let state = common::test_state(store);
    let app = init_app!(state);

    let resp = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_form([("username", "alice@example.com"), ("password", "wrong-password")])
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("WWW-Authenticate").unwrap(), "Bearer");
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Incorrect email or password");
}

#[actix_web::test]
async fn test_protected_route_rejections() {
    let store = common::MemoryStore::new();
    let state = common::test_state(store);
    let app = init_app!(state);

    // Missing header
    let resp = test::TestRequest::get().uri("/api/v1/users/me").send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Not authenticated");

    // Wrong scheme
    let resp = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(("Authorization", "Basic YWxpY2U6c2VjcmV0"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Not authenticated");

    // Garbage token
    let resp = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid token");
}

#[actix_web::test]
async fn test_expired_and_orphaned_tokens() {
    let store = common::MemoryStore::new();
    let alice = common::seed_user(&store, "alice@example.com", "alice").await;
    let state = common::test_state(store);
    let app = init_app!(state);

    let expired = state.codec.issue_token(&alice.email, Duration::seconds(-5)).unwrap();
    let resp = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(("Authorization", format!("Bearer {}", expired)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid token");

    // Well signed, but nobody has that email any more
    let orphan = state.codec.issue_session_token("ghost@example.com").unwrap();
    let resp = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(("Authorization", format!("Bearer {}", orphan)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "User not found");
}

#[actix_web::test]
async fn test_profile_update() {
    let store = common::MemoryStore::new();
    let alice = common::seed_user(&store, "alice@example.com", "alice").await;
    let state = common::test_state(store);
    let app = init_app!(state);
    let auth = common::bearer(&state, &alice);

    let resp = test::TestRequest::put()
        .uri("/api/v1/users/me")
        .insert_header(auth.clone())
        .set_json(json!({ "fullname": "Alice Liddell", "bio": "curiouser" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["fullname"], "Alice Liddell");
    assert_eq!(body["bio"], "curiouser");

    let resp = test::TestRequest::put()
        .uri("/api/v1/users/me")
        .insert_header(auth)
        .set_json(json!({ "profile_picture": "not a url" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
