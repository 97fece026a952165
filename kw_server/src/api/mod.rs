//! HTTP API for the identity server.
//!
//! A thin boundary over [`IdentityService`]: handlers translate requests into
//! identity calls and identity status codes into HTTP responses.
//!
//! # Modules
//!
//! - [`session`]: session creation and renewal with the refresh cookie
//! - [`users`]: registration, the caller's identity, user views
//! - [`codes`]: confirmation code requests
//! - [`middleware`]: authentication and request tracking
//! - [`status`]: status code → HTTP mapping
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                      - Health check (public)
//! POST /api/v1/session              - Basic credentials → session + cookie (public)
//! PUT  /api/v1/session              - Refresh cookie → new session (public)
//! POST /api/v1/codes                - Issue a confirmation code (public)
//! POST /api/v1/users                - Register with confirmed contacts (public)
//! GET  /api/v1/me                   - Authenticated identity (auth required)
//! GET  /api/v1/users/{id}/view      - User view, admin or self (auth required)
//! ```

pub mod codes;
pub mod middleware;
pub mod request_id;
pub mod session;
pub mod status;
pub mod users;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use keyward::{CallContext, IdentityService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Default budget for the identity calls made by one request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh cookie attributes
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
}

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IdentityService>,
    pub cookie: Arc<CookieSettings>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<IdentityService>, cookie: CookieSettings) -> Self {
        Self {
            service,
            cookie: Arc::new(cookie),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Call context bounded by the request timeout
    pub fn context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router(state.clone()))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route(
            "/session",
            post(session::create_session).put(session::renew_session),
        )
        .route("/codes", post(codes::request_code))
        .route("/users", post(users::register));

    let protected_routes = Router::new()
        .route("/me", get(users::me))
        .route("/users/{user_id}/view", get(users::user_view))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the durable store answers, `503 Service Unavailable` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.service.health_check(&state.context()).await.is_ok();

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": healthy,
        "notification_failures": state.service.dispatcher().failures(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
