//! Confirmation code requests.
//!
//! The code is delivered out of band by whoever consumes the
//! `identity.confirmation_code.issued` notification; it never appears in the
//! response.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use keyward::contact::Subject;
use keyward::controller::CodeRequest;
use serde::Serialize;

use super::{AppState, status::ApiResult};
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    /// Normalized email or E.164 phone the code was issued for
    pub subject: String,
}

/// Issue a confirmation code for an email or phone.
///
/// # Response
///
/// `202 Accepted` with the normalized subject.
pub async fn request_code(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let subject = state
        .service
        .request_code(&state.context(), &payload)
        .await
        .inspect_err(|e| {
            if e.is_infrastructure() {
                metrics::infrastructure_errors_total("request_code");
            }
        })?;

    let subject = match subject {
        Subject::Email(value) | Subject::Phone(value) => value,
    };
    Ok((StatusCode::ACCEPTED, Json(CodeResponse { subject })))
}
