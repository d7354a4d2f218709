//! HTTP API for the school portal.
//!
//! # Modules
//!
//! - [`auth`]: Registration, password and QR login, logout
//! - [`account`]: The caller's own profile and password
//! - [`students`]: Controller-only student management
//! - [`middleware`]: Bearer-token authentication for protected endpoints
//! - [`request_id`]: Request correlation and request metrics
//! - [`error`]: Error-to-response mapping
//!
//! # Endpoints Overview
//!
//! Every route is served at the root and mirrored under `/api/v1`.
//!
//! ```text
//! GET  /health                          - Health check (public)
//! POST /register                        - Register a student (public)
//! POST /login                           - Password login (public)
//! POST /login-qr                        - QR token login (public)
//! POST /logout                          - Revoke the current token (auth)
//! GET  /me                              - Own profile (auth)
//! PUT  /me                              - Update own profile (auth)
//! POST /me/password                     - Change own password (auth)
//! GET  /students?includeInactive=bool   - List students (controller)
//! POST /students/{id}/deactivate        - Deactivate a student (controller)
//! POST /students/{id}/activate          - Restore a student (controller)
//! POST /students/{id}/reset-password    - Issue a new password (controller)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sp_server::api::{create_router, AppState};
//! # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod account;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod request_id;
pub mod students;

pub use error::{ApiError, ErrorResponse};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use school_portal::{
    accounts::AccountManager, auth::AuthManager, db::Database, security::RateLimiter,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a shared handle.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub account_manager: Arc<AccountManager>,
    pub login_limiter: RateLimiter,
    /// PostgreSQL handle for health checks; `None` with the in-memory store
    pub database: Option<Database>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let routes = create_routes(state.clone());

    Router::new()
        .merge(routes.clone())
        .nest("/api/v1", routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_routes(state: AppState) -> Router<AppState> {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/login-qr", post(auth::login_qr));

    // Protected routes (require authentication middleware)
    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(account::me).put(account::update_me))
        .route("/me/password", post(account::change_password))
        .route("/students", get(students::list_students))
        .route("/students/{id}/deactivate", post(students::deactivate_student))
        .route("/students/{id}/activate", post(students::activate_student))
        .route(
            "/students/{id}/reset-password",
            post(students::reset_student_password),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the account store is reachable, `503 Service
/// Unavailable` otherwise. The in-memory store is always reachable.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (storage, db_healthy) = match &state.database {
        Some(database) => ("postgres", database.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "success": db_healthy,
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage,
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
