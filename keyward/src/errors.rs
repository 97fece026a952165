//! Identity error types and the flat status-code taxonomy exposed to callers.

use crate::cache::CacheError;
use crate::events::PublishError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete result codes returned to the presentation layer.
///
/// Values are grouped by concern and never shared between two variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    NotOk = 1,

    UserNotFound = 100,
    MinimumOneFieldRequired = 101,

    IncorrectEmail = 200,
    IncorrectPhone = 201,
    EmailNotFound = 202,
    PhoneNotFound = 203,
    EmailConfirmationCodeNotFound = 204,
    PhoneConfirmationCodeNotFound = 205,
    IncorrectEmailCode = 206,
    IncorrectPhoneCode = 207,

    PasswordRequired = 300,
    IncorrectPassword = 301,
    PasswordNotFound = 302,

    IncorrectToken = 400,
    InvalidToken = 401,
    SecretNotFound = 402,
    CredentialsNotProvided = 403,
    SessionNotFound = 404,
    UnsupportedScheme = 405,

    RoleAlreadyExist = 500,
    RoleNotFound = 501,
    UserRoleAlreadyExist = 502,
    UserRoleNotFound = 503,
}

impl StatusCode {
    /// Integer value of the code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Relative severity used when several sub-operations fail at once.
    ///
    /// `NotOk` outranks every validation failure, which all rank equally.
    pub fn severity(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::NotOk => 2,
            _ => 1,
        }
    }
}

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Distributed cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Notification could not be published
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Token or payload encoding failed
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Storage backend failure that is not a database error
    #[error("Store error: {0}")]
    Store(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("User not found")]
    UserNotFound,

    #[error("At least one of email or phone is required")]
    MinimumOneFieldRequired,

    #[error("Incorrect email")]
    IncorrectEmail,

    #[error("Incorrect phone")]
    IncorrectPhone,

    #[error("Email not found")]
    EmailNotFound,

    #[error("Phone not found")]
    PhoneNotFound,

    #[error("No confirmation code pending for this email")]
    EmailConfirmationCodeNotFound,

    #[error("No confirmation code pending for this phone")]
    PhoneConfirmationCodeNotFound,

    #[error("Incorrect email confirmation code")]
    IncorrectEmailCode,

    #[error("Incorrect phone confirmation code")]
    IncorrectPhoneCode,

    #[error("Password required")]
    PasswordRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Password not found")]
    PasswordNotFound,

    /// Malformed token or bad signature
    #[error("Incorrect token")]
    IncorrectToken,

    /// Well-formed, correctly signed token outside its validity window
    #[error("Invalid token")]
    InvalidToken,

    #[error("Secret not found")]
    SecretNotFound,

    #[error("Credentials not provided")]
    CredentialsNotProvided,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Unsupported authorization scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Role already exists")]
    RoleAlreadyExist,

    #[error("Role not found")]
    RoleNotFound,

    #[error("User already holds this role")]
    UserRoleAlreadyExist,

    #[error("User does not hold this role")]
    UserRoleNotFound,
}

impl IdentityError {
    /// Status code reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            IdentityError::Database(_)
            | IdentityError::Cache(_)
            | IdentityError::Publish(_)
            | IdentityError::Encoding(_)
            | IdentityError::HashingFailed
            | IdentityError::Store(_)
            | IdentityError::Cancelled
            | IdentityError::DeadlineExceeded => StatusCode::NotOk,
            IdentityError::UserNotFound => StatusCode::UserNotFound,
            IdentityError::MinimumOneFieldRequired => StatusCode::MinimumOneFieldRequired,
            IdentityError::IncorrectEmail => StatusCode::IncorrectEmail,
            IdentityError::IncorrectPhone => StatusCode::IncorrectPhone,
            IdentityError::EmailNotFound => StatusCode::EmailNotFound,
            IdentityError::PhoneNotFound => StatusCode::PhoneNotFound,
            IdentityError::EmailConfirmationCodeNotFound => {
                StatusCode::EmailConfirmationCodeNotFound
            }
            IdentityError::PhoneConfirmationCodeNotFound => {
                StatusCode::PhoneConfirmationCodeNotFound
            }
            IdentityError::IncorrectEmailCode => StatusCode::IncorrectEmailCode,
            IdentityError::IncorrectPhoneCode => StatusCode::IncorrectPhoneCode,
            IdentityError::PasswordRequired => StatusCode::PasswordRequired,
            IdentityError::IncorrectPassword => StatusCode::IncorrectPassword,
            IdentityError::PasswordNotFound => StatusCode::PasswordNotFound,
            IdentityError::IncorrectToken => StatusCode::IncorrectToken,
            IdentityError::InvalidToken => StatusCode::InvalidToken,
            IdentityError::SecretNotFound => StatusCode::SecretNotFound,
            IdentityError::CredentialsNotProvided => StatusCode::CredentialsNotProvided,
            IdentityError::SessionNotFound => StatusCode::SessionNotFound,
            IdentityError::UnsupportedScheme(_) => StatusCode::UnsupportedScheme,
            IdentityError::RoleAlreadyExist => StatusCode::RoleAlreadyExist,
            IdentityError::RoleNotFound => StatusCode::RoleNotFound,
            IdentityError::UserRoleAlreadyExist => StatusCode::UserRoleAlreadyExist,
            IdentityError::UserRoleNotFound => StatusCode::UserRoleNotFound,
        }
    }

    /// Whether this error points at an infrastructure problem rather than bad input.
    pub fn is_infrastructure(&self) -> bool {
        self.status() == StatusCode::NotOk
    }

    /// Whether the caller gave up on the operation.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            IdentityError::Cancelled | IdentityError::DeadlineExceeded
        )
    }

    /// Whether this error came from the distributed cache tier.
    pub fn is_cache(&self) -> bool {
        matches!(self, IdentityError::Cache(_))
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        if self.is_infrastructure() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Collapse a result into the `(status, value)` pair handed to transport layers.
pub fn status_pair<T>(result: IdentityResult<T>) -> (StatusCode, Option<T>) {
    match result {
        Ok(value) => (StatusCode::Ok, Some(value)),
        Err(e) => (e.status(), None),
    }
}

/// Pick the error to report when several independent checks failed.
///
/// The most severe status wins; among equals the first one is kept.
pub fn most_severe(errors: Vec<IdentityError>) -> Option<IdentityError> {
    let mut worst: Option<IdentityError> = None;
    for error in errors {
        let replace = match &worst {
            None => true,
            Some(current) => error.status().severity() > current.status().severity(),
        };
        if replace {
            worst = Some(error);
        }
    }
    worst
}
