//! Session endpoints: Basic login and cookie-based renewal.
//!
//! The refresh token only travels in an `HttpOnly` cookie scoped to this
//! endpoint; bodies carry the access token and both expiry instants.

use axum::{
    Json,
    extract::State,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE, USER_AGENT},
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use keyward::{IdentityError, RenewRequest, Session};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AppState, CookieSettings,
    status::{ApiError, ApiResult},
};
use crate::{logging, metrics};

/// Client fingerprint header
pub const FINGERPRINT_HEADER: &str = "x-fingerprint";

/// Path the refresh cookie is scoped to
pub const COOKIE_PATH: &str = "/api/v1/session";

/// Session body
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.record.user_id,
            access_token: session.access_token.clone(),
            access_expires_at: session.access_expires_at,
            refresh_expires_at: session.refresh_expires_at(),
        }
    }
}

/// Renewal body; the refresh token comes from the cookie
#[derive(Debug, Deserialize)]
pub struct RenewPayload {
    pub user_id: Uuid,
    pub fingerprint: String,
}

/// Build the refresh cookie for a session
pub fn session_cookie(
    settings: &CookieSettings,
    session: &Session,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let expires = session
        .refresh_expires_at()
        .format("%a, %d %b %Y %H:%M:%S GMT");
    let mut cookie = format!(
        "{}={}; Path={COOKIE_PATH}; HttpOnly; SameSite=Strict; Expires={expires}",
        settings.name,
        session.refresh_token(),
    );
    if settings.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read a cookie value by name
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == name && !val.trim().is_empty()).then(|| val.trim().to_string())
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn respond(
    state: &AppState,
    status: StatusCode,
    session: &Session,
) -> ApiResult<(StatusCode, HeaderMap, Json<SessionResponse>)> {
    let cookie = session_cookie(&state.cookie, session)
        .map_err(|e| IdentityError::Encoding(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((status, headers, Json(SessionResponse::from(session))))
}

/// Create a session from Basic credentials.
///
/// # Request Headers
///
/// ```text
/// Authorization: Basic base64(identifier:password-or-code)
/// X-Fingerprint: <client fingerprint>
/// ```
///
/// # Response
///
/// `201 Created` with [`SessionResponse`] and the refresh cookie.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let fingerprint = header_str(&headers, FINGERPRINT_HEADER);
    if fingerprint.is_empty() {
        return Err(IdentityError::CredentialsNotProvided.into());
    }

    let result = state
        .service
        .login(
            &state.context(),
            header_str(&headers, AUTHORIZATION.as_str()),
            fingerprint,
            header_str(&headers, USER_AGENT.as_str()),
        )
        .await;

    match result {
        Ok(session) => {
            metrics::sessions_issued_total("login");
            metrics::auth_attempts_total("basic", keyward::StatusCode::Ok);
            respond(&state, StatusCode::CREATED, &session)
        }
        Err(e) => {
            metrics::auth_attempts_total("basic", e.status());
            if e.is_infrastructure() {
                metrics::infrastructure_errors_total("login");
            } else {
                logging::log_security_event(
                    "failed_login",
                    None,
                    Some(fingerprint),
                    &e.to_string(),
                );
            }
            Err(ApiError::from(e))
        }
    }
}

/// Exchange the refresh cookie for a new session.
///
/// # Errors
///
/// `401 Unauthorized` with `SessionNotFound` when the cookie is missing, spent
/// or expired, or does not match user and fingerprint.
pub async fn renew_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RenewPayload>,
) -> ApiResult<impl IntoResponse> {
    let refresh_token =
        extract_cookie(&headers, &state.cookie.name).ok_or(IdentityError::SessionNotFound)?;

    let request = RenewRequest {
        user_id: payload.user_id,
        refresh_token,
        fingerprint: payload.fingerprint,
        user_agent: header_str(&headers, USER_AGENT.as_str()).to_string(),
    };

    match state.service.renew_session(&state.context(), &request).await {
        Ok(session) => {
            metrics::sessions_issued_total("renew");
            respond(&state, StatusCode::OK, &session)
        }
        Err(e) => {
            if e.is_infrastructure() {
                metrics::infrastructure_errors_total("renew_session");
            } else {
                logging::log_security_event(
                    "failed_renewal",
                    Some(request.user_id),
                    Some(&request.fingerprint),
                    &e.to_string(),
                );
            }
            Err(ApiError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward::db::SessionRecord;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            record: SessionRecord {
                id: Uuid::new_v4(),
                refresh_token: "refresh-123".to_string(),
                fingerprint: "fp".to_string(),
                user_id: Uuid::new_v4(),
                secret_id: Uuid::new_v4(),
                user_agent: "agent".to_string(),
                created_at: now,
                expires_at: now + chrono::Duration::days(30),
            },
            access_token: "access".to_string(),
            access_expires_at: now + chrono::Duration::minutes(15),
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let settings = CookieSettings {
            name: "kw_refresh".to_string(),
            secure: true,
        };
        let cookie = session_cookie(&settings, &session()).unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("kw_refresh=refresh-123; "));
        assert!(cookie.contains("Path=/api/v1/session"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Expires="));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_insecure_cookie_for_local_development() {
        let settings = CookieSettings {
            name: "kw_refresh".to_string(),
            secure: false,
        };
        let cookie = session_cookie(&settings, &session()).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_extract_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; kw_refresh=abc; other=1"),
        );

        assert_eq!(extract_cookie(&headers, "kw_refresh").as_deref(), Some("abc"));
        assert_eq!(extract_cookie(&headers, "missing"), None);
        assert_eq!(extract_cookie(&HeaderMap::new(), "kw_refresh"), None);
    }
}
