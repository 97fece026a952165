//! Durable identity records and projection types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contact::NormalizedPhone;
pub use crate::secrets::SecretId;

/// User ID type
pub type UserId = Uuid;

/// Role ID type
pub type RoleId = Uuid;

/// Session ID type
pub type SessionId = Uuid;

/// Password ID type; the highest id per user is authoritative
pub type PasswordId = i64;

/// Identity anchor. Deleting it cascades to everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Normalized, globally unique email address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub email: String,
}

/// E.164 phone number with its country calling code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub phone: String,
    pub country_code: i32,
}

/// Append-only password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    pub id: PasswordId,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub created_at: DateTime<Utc>,
    pub title: String,
}

/// Role assignment; (user_id, role_id) is unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// A contact record after an upsert, with the owner it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attached<T> {
    pub record: T,
    /// Set only when the upsert moved the record away from another user
    pub previous_owner: Option<UserId>,
}

/// Phone input to registration and attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPhone {
    pub phone: String,
    pub country_code: i32,
}

impl From<NormalizedPhone> for NewPhone {
    fn from(phone: NormalizedPhone) -> Self {
        Self {
            phone: phone.e164,
            country_code: i32::from(phone.country_code),
        }
    }
}

/// Registration input; every field is already validated and normalized.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<NewPhone>,
    pub password_hash: Option<String>,
}

/// Records produced by a registration transaction
#[derive(Debug, Clone)]
pub struct Registered {
    pub user: User,
    pub email: Option<Attached<Email>>,
    pub phone: Option<Attached<Phone>>,
    pub password: Option<Password>,
}

/// Durable session row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub refresh_token: String,
    pub fingerprint: String,
    pub user_id: UserId,
    pub secret_id: SecretId,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Denormalized read model of one user.
///
/// Every array is distinct and sorted, so identical identity facts always
/// serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub role_ids: Vec<RoleId>,
}

impl UserView {
    pub fn has_role(&self, title: &str) -> bool {
        self.roles.iter().any(|role| role == title)
    }
}

/// Result of a projection recompute statement
#[derive(Debug, Clone, Default)]
pub struct Recomputed {
    /// Current view of every affected user that still exists
    pub views: Vec<UserView>,
    /// Users whose stored row actually changed
    pub written: Vec<UserId>,
}

/// Filter for paginated view queries; all set fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserViewFilter {
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Page request, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Largest page size a caller may request
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl PaginationInfo {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        let per_page = u64::from(pagination.per_page);
        Self {
            page: pagination.page,
            per_page: pagination.per_page,
            total,
            pages: total.div_ceil(per_page),
        }
    }
}
