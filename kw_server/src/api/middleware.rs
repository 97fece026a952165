//! Authentication middleware for protected endpoints.
//!
//! The middleware resolves the `Authorization` header through the identity
//! service and injects the resulting [`Identity`] into request extensions.
//!
//! # Extracting the identity
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use keyward::Identity;
//!
//! async fn protected_handler(Extension(identity): Extension<Identity>) -> String {
//!     format!("Authenticated as user {}", identity.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use keyward::StatusCode;

use super::{AppState, status::ApiError};
use crate::{logging, metrics};

/// Scheme label for metrics; unknown schemes are folded together
fn scheme_label(authorization: &str) -> &'static str {
    let scheme = authorization.split_whitespace().next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("bearer") {
        "bearer"
    } else if scheme.eq_ignore_ascii_case("basic") {
        "basic"
    } else {
        "other"
    }
}

/// Authentication middleware
///
/// # Behavior
///
/// - **Success**: Injects `Identity` into request extensions and calls the next handler
/// - **Missing header**: `401 Unauthorized` with `CredentialsNotProvided`
/// - **Rejected credentials**: The mapped identity status
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let scheme = scheme_label(&authorization);

    match state
        .service
        .authenticate(&state.context(), &authorization)
        .await
    {
        Ok(identity) => {
            metrics::auth_attempts_total(scheme, StatusCode::Ok);
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            metrics::auth_attempts_total(scheme, e.status());
            if e.is_infrastructure() {
                metrics::infrastructure_errors_total("authenticate");
            } else {
                logging::log_security_event("rejected_credentials", None, None, &e.to_string());
            }
            ApiError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_label() {
        assert_eq!(scheme_label("Bearer abc"), "bearer");
        assert_eq!(scheme_label("basic abc"), "basic");
        assert_eq!(scheme_label("Digest abc"), "other");
        assert_eq!(scheme_label(""), "other");
    }
}
