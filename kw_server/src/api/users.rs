//! User endpoints: registration, the caller's own identity, user views.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use keyward::Identity;
use keyward::controller::RegisterRequest;
use keyward::db::UserView;
use uuid::Uuid;

use super::{
    AppState,
    status::{ApiError, ApiResult},
};
use crate::metrics;

/// Register a user with confirmed contacts.
///
/// # Request Body
///
/// ```json
/// {
///   "email": { "value": "a@b.com", "code": "123456" },
///   "password": "correct horse battery staple"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the new user's view.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .service
        .register_user(&state.context(), &payload)
        .await
        .inspect_err(|e| {
            if e.is_infrastructure() {
                metrics::infrastructure_errors_total("register_user");
            }
        })?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Identity resolved from the caller's credentials
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// View of one user; admins see everyone, other callers only themselves
pub async fn user_view(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    if !identity.admin && identity.user_id != user_id {
        return Err(ApiError::Forbidden);
    }

    let view = state
        .service
        .get_user_view(&state.context(), user_id)
        .await?;
    Ok(Json(view))
}
