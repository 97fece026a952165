//! HTTP integration tests over in-memory identity backends.
//!
//! Exercises the full router: code issuance, registration, Basic login with
//! the refresh cookie, cookie renewal and the bearer-protected endpoints.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use keyward::cache::MemoryCache;
use keyward::config::{IdentityConfig, PasswordConfig};
use keyward::db::MemoryIdentityStore;
use keyward::events::MemoryPublisher;
use keyward::{CallContext, EventDispatcher, IdentityController, IdentityService, Topic};
use kw_server::api::session::{FINGERPRINT_HEADER, SessionResponse};
use kw_server::api::{AppState, CookieSettings, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const COOKIE_NAME: &str = "kw_refresh";
const PASSWORD: &str = "correct horse battery staple";

struct TestServer {
    router: Router,
    publisher: Arc<MemoryPublisher>,
}

/// Helper to create a router over in-memory backends
async fn create_test_server() -> TestServer {
    let config = IdentityConfig {
        password: PasswordConfig {
            pepper: "api-test-pepper".to_string(),
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..IdentityConfig::development()
    };
    let controller = IdentityController::new(
        &config,
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryCache::new()),
    )
    .expect("controller should build");
    let publisher = Arc::new(MemoryPublisher::new());
    let service = Arc::new(IdentityService::new(
        controller,
        EventDispatcher::new(publisher.clone()),
    ));
    service
        .bootstrap_admin_role(&CallContext::new())
        .await
        .expect("admin role should bootstrap");

    let state = AppState::new(
        service,
        CookieSettings {
            name: COOKIE_NAME.to_string(),
            secure: false,
        },
    );

    TestServer {
        router: create_router(state),
        publisher,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn basic(identifier: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{identifier}:{password}")))
}

/// Helper to request a code over HTTP and read it from the published notification
async fn request_code(server: &TestServer, email: &str) -> String {
    let mut receiver = server.publisher.subscribe();
    let response = server
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/codes",
            json!({"channel": "email", "value": email}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    loop {
        let published = receiver.recv().await.unwrap();
        if published.topic == Topic::ConfirmationCodeIssued {
            return published.envelope.data["code"].as_str().unwrap().to_string();
        }
    }
}

/// Helper to register a user with an email and password, returning its id
async fn register(server: &TestServer, email: &str) -> String {
    let code = request_code(server, email).await;
    let response = server
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/users",
            json!({"email": {"value": email, "code": code}, "password": PASSWORD}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let view = body_json(response).await;
    view["user_id"].as_str().unwrap().to_string()
}

async fn login(server: &TestServer, email: &str) -> axum::response::Response {
    server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/session")
                .header(header::AUTHORIZATION, basic(email, PASSWORD))
                .header(FINGERPRINT_HEADER, "fp-1")
                .header(header::USER_AGENT, "api-tests")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

fn refresh_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("refresh cookie should be set")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;

    let response = server
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_register_then_login_sets_refresh_cookie() {
    let server = create_test_server().await;
    let user_id = register(&server, "Alice@Example.com").await;

    let response = login(&server, "alice@example.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("kw_refresh="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/api/v1/session"));
    assert!(!set_cookie.contains("Secure"));

    let session: SessionResponse =
        serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(session.user_id.to_string(), user_id);
    assert!(!session.access_token.is_empty());
    assert!(session.refresh_expires_at > session.access_expires_at);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let server = create_test_server().await;
    register(&server, "bob@example.com").await;

    let response = server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/session")
                .header(header::AUTHORIZATION, basic("bob@example.com", "not it"))
                .header(FINGERPRINT_HEADER, "fp-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_renew_with_cookie() {
    let server = create_test_server().await;
    let user_id = register(&server, "carol@example.com").await;
    let first = login(&server, "carol@example.com").await;
    let cookie = refresh_cookie(&first);

    let renew = |cookie: String| {
        let mut request = json_request(
            "PUT",
            "/api/v1/session",
            json!({"user_id": user_id, "fingerprint": "fp-1"}),
        );
        request
            .headers_mut()
            .insert(header::COOKIE, cookie.parse().unwrap());
        server.router.clone().oneshot(request)
    };

    let response = renew(cookie.clone()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = refresh_cookie(&response);
    assert_ne!(rotated, cookie);

    // The spent refresh token cannot be replayed
    let replay = renew(cookie).await.unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(replay).await;
    assert_eq!(body["code"], keyward::StatusCode::SessionNotFound.code());
}

#[tokio::test]
async fn test_renew_without_cookie() {
    let server = create_test_server().await;

    let response = server
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/session",
            json!({"user_id": uuid::Uuid::new_v4(), "fingerprint": "fp-1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], keyward::StatusCode::SessionNotFound.code());
}

#[tokio::test]
async fn test_me_with_bearer_token() {
    let server = create_test_server().await;
    let user_id = register(&server, "dave@example.com").await;
    let session: SessionResponse =
        serde_json::from_value(body_json(login(&server, "dave@example.com").await).await)
            .unwrap();

    let response = server
        .router
        .clone()
        .oneshot(
            Request::get("/api/v1/me")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", session.access_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let identity = body_json(response).await;
    assert_eq!(identity["user_id"], user_id);
    assert_eq!(identity["admin"], false);
}

#[tokio::test]
async fn test_protected_endpoint_requires_credentials() {
    let server = create_test_server().await;

    let response = server
        .router
        .clone()
        .oneshot(Request::get("/api/v1/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_view_of_another_user_is_forbidden() {
    let server = create_test_server().await;
    let own_id = register(&server, "erin@example.com").await;
    let other_id = register(&server, "frank@example.com").await;
    let authorization = basic("erin@example.com", PASSWORD);

    let view = |user_id: &str| {
        server.router.clone().oneshot(
            Request::get(format!("/api/v1/users/{user_id}/view"))
                .header(header::AUTHORIZATION, authorization.clone())
                .body(Body::empty())
                .unwrap(),
        )
    };

    let own = view(&own_id).await.unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    let body = body_json(own).await;
    assert_eq!(body["emails"], json!(["erin@example.com"]));

    let other = view(&other_id).await.unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_with_wrong_code() {
    let server = create_test_server().await;
    request_code(&server, "gina@example.com").await;

    let response = server
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/users",
            json!({"email": {"value": "gina@example.com", "code": "000000x"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
