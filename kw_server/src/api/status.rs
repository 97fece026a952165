//! Mapping of identity status codes onto HTTP responses.

use axum::{
    Json,
    http::StatusCode as HttpStatus,
    response::{IntoResponse, Response},
};
use keyward::{IdentityError, StatusCode};
use serde::Serialize;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Identity status code
    pub code: i32,
    pub error: String,
}

/// HTTP status for an identity status code
pub fn http_status(status: StatusCode) -> HttpStatus {
    match status {
        StatusCode::Ok => HttpStatus::OK,
        StatusCode::NotOk => HttpStatus::INTERNAL_SERVER_ERROR,

        StatusCode::MinimumOneFieldRequired
        | StatusCode::IncorrectEmail
        | StatusCode::IncorrectPhone
        | StatusCode::PasswordRequired => HttpStatus::BAD_REQUEST,

        StatusCode::EmailConfirmationCodeNotFound
        | StatusCode::PhoneConfirmationCodeNotFound
        | StatusCode::IncorrectEmailCode
        | StatusCode::IncorrectPhoneCode
        | StatusCode::IncorrectPassword
        | StatusCode::IncorrectToken
        | StatusCode::InvalidToken
        | StatusCode::SecretNotFound
        | StatusCode::CredentialsNotProvided
        | StatusCode::SessionNotFound
        | StatusCode::UnsupportedScheme => HttpStatus::UNAUTHORIZED,

        StatusCode::UserNotFound
        | StatusCode::EmailNotFound
        | StatusCode::PhoneNotFound
        | StatusCode::PasswordNotFound
        | StatusCode::RoleNotFound
        | StatusCode::UserRoleNotFound => HttpStatus::NOT_FOUND,

        StatusCode::RoleAlreadyExist | StatusCode::UserRoleAlreadyExist => HttpStatus::CONFLICT,
    }
}

/// Handler error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Authenticated, but not allowed to see the resource
    #[error("Forbidden")]
    Forbidden,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Identity(error) => {
                let status = error.status();
                let http = match error {
                    IdentityError::DeadlineExceeded => HttpStatus::GATEWAY_TIMEOUT,
                    IdentityError::Cancelled => HttpStatus::SERVICE_UNAVAILABLE,
                    _ => http_status(status),
                };
                (
                    http,
                    Json(ErrorResponse {
                        code: status.code(),
                        error: error.client_message(),
                    }),
                )
                    .into_response()
            }
            ApiError::Forbidden => (
                HttpStatus::FORBIDDEN,
                Json(ErrorResponse {
                    code: StatusCode::NotOk.code(),
                    error: "Forbidden".to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;
