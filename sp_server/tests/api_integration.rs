//! Integration tests for the HTTP API.
//!
//! Requests go through the full router (request ids, CORS, auth middleware)
//! against the in-memory account store, so no database is needed.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use school_portal::accounts::AccountManager;
use school_portal::auth::{AuthManager, CredentialIssuer, NewController, TokenDenylist};
use school_portal::db::{AccountRepository, InMemoryAccountRepository};
use school_portal::mail::LogMailer;
use school_portal::security::{LOGIN_ENDPOINT, RateLimitConfig, RateLimiter};
use serde_json::{Value, json};
use sp_server::api::{AppState, create_router, request_id::REQUEST_ID_HEADER};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const CONTROLLER_PASSWORD: &str = "Controller123";

struct TestServer {
    app: axum::Router,
    accounts: Arc<AccountManager>,
    mailer: Arc<LogMailer>,
}

fn create_test_server() -> TestServer {
    let repo: Arc<dyn AccountRepository> = Arc::new(InMemoryAccountRepository::new());
    let issuer = CredentialIssuer::new("test_pepper_for_testing_only".to_string());
    let mailer = Arc::new(LogMailer::new());

    let auth_manager = Arc::new(AuthManager::new(
        repo.clone(),
        issuer.clone(),
        Arc::new(TokenDenylist::new()),
        "test_secret_key_for_testing_only_32ch".to_string(),
    ));
    let accounts = Arc::new(AccountManager::new(repo, issuer, mailer.clone()));

    let login_limiter = RateLimiter::with_configs([(
        LOGIN_ENDPOINT.to_string(),
        RateLimitConfig {
            max_attempts: 5,
            window_secs: 300,
            lockout_secs: 900,
            exponential_backoff: true,
        },
    )]);

    let state = AppState {
        auth_manager,
        account_manager: accounts.clone(),
        login_limiter,
        database: None,
    };

    TestServer {
        app: create_router(state),
        accounts,
        mailer,
    }
}

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn student_body(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "class": "10",
        "division": "A",
        "parentName": "Ali",
        "place": "City"
    })
}

/// Register a student and return (id, username, password)
async fn register(app: &axum::Router, name: &str, email: &str) -> (i64, String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/register",
        None,
        Some(student_body(name, email)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "registration failed: {body}");
    let student = &body["student"];
    (
        student["id"].as_i64().unwrap(),
        student["username"].as_str().unwrap().to_string(),
        student["password"].as_str().unwrap().to_string(),
    )
}

async fn login_token(app: &axum::Router, username: &str, password: &str, role: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": username, "password": password, "role": role})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn controller_token(server: &TestServer) -> String {
    server
        .accounts
        .create_controller(NewController {
            username: "principal".to_string(),
            email: "principal@example.com".to_string(),
            name: "Principal".to_string(),
            password: CONTROLLER_PASSWORD.to_string(),
        })
        .await
        .unwrap();
    login_token(&server.app, "principal", CONTROLLER_PASSWORD, "primary").await
}

// ============================================================================
// Health and routing
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = create_test_server();
    let (status, body) = send(&server.app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_404_for_invalid_endpoint() {
    let server = create_test_server();
    let (status, _) = send(&server.app, Method::GET, "/nonexistent", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_header_present() {
    let server = create_test_server();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = server.app.clone().oneshot(request).await.unwrap();
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("response should carry a request id");
    assert!(!request_id.is_empty());
}

#[tokio::test]
async fn test_cors_headers_present() {
    let server = create_test_server();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/login")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = server.app.clone().oneshot(request).await.unwrap();
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}

#[tokio::test]
async fn test_versioned_prefix_mirrors_routes() {
    let server = create_test_server();
    let (id, username, password) =
        register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    let (status, body) = send(
        &server.app,
        Method::POST,
        "/api/v1/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], id);

    let (status, _) = send(&server.app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_returns_credentials() {
    let server = create_test_server();
    let (status, body) = send(
        &server.app,
        Method::POST,
        "/register",
        None,
        Some(student_body("Ahmed Hassan", "ahmed@example.com")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let student = &body["student"];
    assert!(
        student["username"]
            .as_str()
            .unwrap()
            .starts_with("ahmedhassan")
    );
    assert_eq!(student["qrToken"].as_str().unwrap().len(), 64);
    assert!(
        student["qrCodeImage"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml;base64,")
    );
    assert_eq!(student["emailSent"], true);
    assert_eq!(server.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let server = create_test_server();
    register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    let (status, body) = send(
        &server.app,
        Method::POST,
        "/register",
        None,
        Some(student_body("Ahmed Hassan", "AHMED@example.com")),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["field"], "email");
}

#[tokio::test]
async fn test_register_missing_field_names_it() {
    let server = create_test_server();
    let (status, body) = send(
        &server.app,
        Method::POST,
        "/register",
        None,
        Some(json!({"name": "Ahmed Hassan", "email": "ahmed@example.com"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["field"].is_string());
}

#[tokio::test]
async fn test_malformed_json_request() {
    let server = create_test_server();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{invalid json"))
        .unwrap();

    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_and_fetch_profile() {
    let server = create_test_server();
    let (id, username, password) =
        register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = login_token(&server.app, &username, &password, "student").await;

    let (status, body) = send(&server.app, Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], id);
    assert_eq!(body["user"]["role"], "student");
    assert_eq!(body["user"]["class"], "10");
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_login_by_email() {
    let server = create_test_server();
    let (id, _, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    let (status, body) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"email": "ahmed@example.com", "password": password, "role": "student"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], id);
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_invalid_login_returns_generic_error() {
    let server = create_test_server();
    let (_, username, _) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    let (wrong_status, wrong) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": username, "password": "Wrong123456"})),
    )
    .await;
    let (unknown_status, unknown) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": "nobody0000", "password": "Wrong123456"})),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["error"], unknown["error"]);
}

#[tokio::test]
async fn test_student_cannot_login_as_controller() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    let (status, _) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": username, "password": password, "role": "controller"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rate_limited_after_repeated_failures() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    for _ in 0..5 {
        let (status, _) = send(
            &server.app,
            Method::POST,
            "/login",
            None,
            Some(json!({"username": username, "password": "Wrong123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": username, "password": password}).to_string(),
        ))
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();

    // Locked even with the right password
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_successful_login_resets_failure_count() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;

    for _ in 0..4 {
        send(
            &server.app,
            Method::POST,
            "/login",
            None,
            Some(json!({"username": username, "password": "Wrong123456"})),
        )
        .await;
    }
    login_token(&server.app, &username, &password, "student").await;

    for _ in 0..4 {
        let (status, _) = send(
            &server.app,
            Method::POST,
            "/login",
            None,
            Some(json!({"username": username, "password": "Wrong123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_qr_login() {
    let server = create_test_server();
    let (status, body) = send(
        &server.app,
        Method::POST,
        "/register",
        None,
        Some(student_body("Sara Omar", "sara@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let qr_token = body["student"]["qrToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &server.app,
        Method::POST,
        "/login-qr",
        None,
        Some(json!({"qrToken": qr_token, "role": "student"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "sara@example.com");

    let (status, _) = send(
        &server.app,
        Method::POST,
        "/login-qr",
        None,
        Some(json!({"qrToken": "0".repeat(64), "role": "student"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Sessions and profile
// ============================================================================

#[tokio::test]
async fn test_protected_route_requires_token() {
    let server = create_test_server();

    let (status, _) = send(&server.app, Method::GET, "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&server.app, Method::GET, "/me", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = login_token(&server.app, &username, &password, "student").await;

    let (status, body) = send(&server.app, Method::POST, "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&server.app, Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_profile() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = login_token(&server.app, &username, &password, "student").await;

    let (status, body) = send(
        &server.app,
        Method::PUT,
        "/me",
        Some(&token),
        Some(json!({"class": "11", "division": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["class"], "11");
    assert_eq!(body["user"]["division"], "B");
    assert_eq!(body["user"]["place"], "City");
    assert_eq!(body["user"]["username"], username.as_str());
}

#[tokio::test]
async fn test_change_password() {
    let server = create_test_server();
    let (_, username, password) = register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = login_token(&server.app, &username, &password, "student").await;

    let (status, _) = send(
        &server.app,
        Method::POST,
        "/me/password",
        Some(&token),
        Some(json!({"currentPassword": "Wrong123456", "newPassword": "Better12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &server.app,
        Method::POST,
        "/me/password",
        Some(&token),
        Some(json!({"currentPassword": password, "newPassword": "weak"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "password");

    let (status, _) = send(
        &server.app,
        Method::POST,
        "/me/password",
        Some(&token),
        Some(json!({"currentPassword": password, "newPassword": "Better12345"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    login_token(&server.app, &username, "Better12345", "student").await;
}

// ============================================================================
// Controller operations
// ============================================================================

#[tokio::test]
async fn test_student_forbidden_from_controller_routes() {
    let server = create_test_server();
    let (id, username, password) =
        register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = login_token(&server.app, &username, &password, "student").await;

    let (status, _) = send(&server.app, Method::GET, "/students", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &server.app,
        Method::POST,
        &format!("/students/{id}/deactivate"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_controller_deactivates_student() {
    let server = create_test_server();
    let (id, username, password) =
        register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let student_token = login_token(&server.app, &username, &password, "student").await;
    let token = controller_token(&server).await;

    let (status, body) = send(&server.app, Method::GET, "/students", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &server.app,
        Method::POST,
        &format!("/students/{id}/deactivate"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["isActive"], false);

    // Existing session and new logins both stop working
    let (status, _) = send(&server.app, Method::GET, "/me", Some(&student_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(&server.app, Method::GET, "/students", Some(&token), None).await;
    assert!(body["students"].as_array().unwrap().is_empty());
    let (_, body) = send(
        &server.app,
        Method::GET,
        "/students?includeInactive=true",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["students"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &server.app,
        Method::POST,
        &format!("/students/{id}/activate"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login_token(&server.app, &username, &password, "student").await;
}

#[tokio::test]
async fn test_controller_resets_student_password() {
    let server = create_test_server();
    let (id, username, old_password) =
        register(&server.app, "Ahmed Hassan", "ahmed@example.com").await;
    let token = controller_token(&server).await;

    let (status, body) = send(
        &server.app,
        Method::POST,
        &format!("/students/{id}/reset-password"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["emailSent"], true);
    let new_password = body["password"].as_str().unwrap().to_string();

    login_token(&server.app, &username, &new_password, "student").await;
    let (status, _) = send(
        &server.app,
        Method::POST,
        "/login",
        None,
        Some(json!({"username": username, "password": old_password})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_student_is_not_found() {
    let server = create_test_server();
    let token = controller_token(&server).await;

    let (status, _) = send(
        &server.app,
        Method::POST,
        "/students/9999/deactivate",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_student_id_returns_json_error() {
    let server = create_test_server();
    let token = controller_token(&server).await;

    for route in ["deactivate", "activate", "reset-password"] {
        let (status, body) = send(
            &server.app,
            Method::POST,
            &format!("/students/abc/{route}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{route}");
        assert_eq!(body["success"], false);
        assert_eq!(body["field"], "path");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_list_query_returns_json_error() {
    let server = create_test_server();
    let token = controller_token(&server).await;

    let (status, body) = send(
        &server.app,
        Method::GET,
        "/students?includeInactive=yes",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["field"], "query");
}

#[tokio::test]
async fn test_concurrent_registration() {
    let server = create_test_server();
    let mut handles = vec![];

    for i in 0..10 {
        let app = server.app.clone();
        handles.push(tokio::spawn(async move {
            send(
                &app,
                Method::POST,
                "/register",
                None,
                Some(student_body("Ahmed Hassan", &format!("ahmed{i}@example.com"))),
            )
            .await
        }));
    }

    let mut usernames = std::collections::HashSet::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(usernames.insert(body["student"]["username"].as_str().unwrap().to_string()));
    }
}
