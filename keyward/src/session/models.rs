//! Session data models.

use crate::db::{SessionRecord, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issued session: the durable row plus the bearer token minted with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub record: SessionRecord,
    /// Bearer token signed with the record's secret
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
}

impl Session {
    pub fn refresh_token(&self) -> &str {
        &self.record.refresh_token
    }

    /// Expiry of the refresh token; the cookie lifetime follows it
    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        self.record.expires_at
    }
}

/// Session renewal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewRequest {
    pub user_id: UserId,
    pub refresh_token: String,
    pub fingerprint: String,
    pub user_agent: String,
}
