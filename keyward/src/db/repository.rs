//! Repository trait definitions for testability and dependency injection.
//!
//! [`IdentityStore`] is the write-of-record for every identity fact. The
//! PostgreSQL implementation lives here; [`super::MemoryIdentityStore`] backs
//! tests and single-process development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::models::{
    Attached, Email, NewPhone, NewUser, Pagination, PaginationInfo, Password, Phone, Recomputed,
    Registered, Role, RoleId, SessionId, SessionRecord, User, UserId, UserRole, UserView,
    UserViewFilter,
};
use crate::errors::{IdentityError, IdentityResult};
use crate::secrets::{Secret, SecretId};

/// Durable identity store contract
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cheap round trip proving the store is reachable
    async fn health_check(&self) -> IdentityResult<()>;

    /// Create a user with its initial contacts and password in one transaction
    async fn create_user(&self, new_user: &NewUser) -> IdentityResult<Registered>;

    async fn get_user(&self, id: UserId) -> IdentityResult<Option<User>>;

    /// Delete a user and everything it owns (`UserNotFound` if absent)
    async fn delete_user(&self, id: UserId) -> IdentityResult<()>;

    /// Attach an email, taking it over from its current owner if needed
    async fn upsert_email(&self, user_id: UserId, email: &str) -> IdentityResult<Attached<Email>>;

    async fn get_email(&self, email: &str) -> IdentityResult<Option<Email>>;

    /// Attach a phone, taking it over from its current owner if needed
    async fn upsert_phone(
        &self,
        user_id: UserId,
        phone: &NewPhone,
    ) -> IdentityResult<Attached<Phone>>;

    async fn get_phone(&self, phone: &str) -> IdentityResult<Option<Phone>>;

    /// Append a password hash
    async fn create_password(&self, user_id: UserId, hash: &str) -> IdentityResult<Password>;

    /// Password with the highest id for the user
    async fn latest_password(&self, user_id: UserId) -> IdentityResult<Option<Password>>;

    /// Create a role (`RoleAlreadyExist` on duplicate title)
    async fn create_role(&self, title: &str) -> IdentityResult<Role>;

    async fn get_role(&self, id: RoleId) -> IdentityResult<Option<Role>>;

    async fn get_role_by_title(&self, title: &str) -> IdentityResult<Option<Role>>;

    /// Change a role's title (`RoleNotFound`, `RoleAlreadyExist`)
    async fn rename_role(&self, id: RoleId, title: &str) -> IdentityResult<Role>;

    /// Assign a role (`UserRoleAlreadyExist`, `UserNotFound`, `RoleNotFound`)
    async fn create_user_role(&self, user_id: UserId, role_id: RoleId)
    -> IdentityResult<UserRole>;

    /// Revoke a role (`UserRoleNotFound`)
    async fn delete_user_role(&self, user_id: UserId, role_id: RoleId) -> IdentityResult<()>;

    /// Distinct users currently assigned any of the roles
    async fn users_with_roles(&self, role_ids: &[RoleId]) -> IdentityResult<Vec<UserId>>;

    async fn create_session(&self, session: &SessionRecord) -> IdentityResult<()>;

    /// Unexpired session matching all three fields exactly
    async fn find_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<SessionRecord>>;

    /// Delete session `old` and insert `new` in one transaction.
    ///
    /// `SessionNotFound` when `old` is already gone, in which case nothing is
    /// written; concurrent rotations of one session therefore succeed once.
    async fn rotate_session(&self, old: SessionId, new: &SessionRecord) -> IdentityResult<()>;

    async fn insert_secret(&self, secret: &Secret) -> IdentityResult<()>;

    async fn get_secret(&self, id: SecretId) -> IdentityResult<Option<Secret>>;

    /// Recompute and upsert the views of the given users.
    ///
    /// Rows whose computed content equals the stored content are not written.
    async fn recompute_user_views(&self, user_ids: &[UserId]) -> IdentityResult<Recomputed>;

    /// Recompute the views of every user assigned one of the roles
    async fn recompute_role_views(&self, role_ids: &[RoleId]) -> IdentityResult<Recomputed>;

    async fn get_user_view(&self, user_id: UserId) -> IdentityResult<Option<UserView>>;

    async fn get_user_views(
        &self,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)>;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Name of the violated foreign key constraint, if that is what failed
fn foreign_key_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

/// Map a write error where the only foreign key is the owning user
fn owner_error(err: sqlx::Error) -> IdentityError {
    if foreign_key_violation(&err).is_some() {
        IdentityError::UserNotFound
    } else {
        err.into()
    }
}

fn email_from_row(row: &PgRow) -> Result<Email, sqlx::Error> {
    Ok(Email {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
    })
}

fn phone_from_row(row: &PgRow) -> Result<Phone, sqlx::Error> {
    Ok(Phone {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        user_id: row.try_get("user_id")?,
        phone: row.try_get("phone")?,
        country_code: row.try_get("country_code")?,
    })
}

fn password_from_row(row: &PgRow) -> Result<Password, sqlx::Error> {
    Ok(Password {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        user_id: row.try_get("user_id")?,
        hash: row.try_get("hash")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        title: row.try_get("title")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<SessionRecord, sqlx::Error> {
    Ok(SessionRecord {
        id: row.try_get("id")?,
        refresh_token: row.try_get("refresh_token")?,
        fingerprint: row.try_get("fingerprint")?,
        user_id: row.try_get("user_id")?,
        secret_id: row.try_get("secret_id")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn view_from_row(row: &PgRow) -> Result<UserView, sqlx::Error> {
    Ok(UserView {
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        roles: row.try_get("roles")?,
        phones: row.try_get("phones")?,
        emails: row.try_get("emails")?,
        role_ids: row.try_get("role_ids")?,
    })
}

fn attached<T>(record: T, owner: UserId, previous: Option<UserId>) -> Attached<T> {
    Attached {
        record,
        previous_owner: previous.filter(|previous| *previous != owner),
    }
}

async fn upsert_email_with<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: UserId,
    email: &str,
) -> Result<Attached<Email>, sqlx::Error> {
    let row = sqlx::query(
        "WITH previous AS (SELECT user_id FROM emails WHERE email = $2)
         INSERT INTO emails (id, created_at, user_id, email) VALUES ($1, NOW(), $3, $2)
         ON CONFLICT (email) DO UPDATE
             SET user_id = EXCLUDED.user_id, created_at = EXCLUDED.created_at
         RETURNING id, created_at, user_id, email,
                   (SELECT user_id FROM previous) AS previous_owner",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(attached(
        email_from_row(&row)?,
        user_id,
        row.try_get("previous_owner")?,
    ))
}

async fn upsert_phone_with<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: UserId,
    phone: &NewPhone,
) -> Result<Attached<Phone>, sqlx::Error> {
    let row = sqlx::query(
        "WITH previous AS (SELECT user_id FROM phones WHERE phone = $2)
         INSERT INTO phones (id, created_at, user_id, phone, country_code)
         VALUES ($1, NOW(), $3, $2, $4)
         ON CONFLICT (phone) DO UPDATE
             SET user_id = EXCLUDED.user_id,
                 created_at = EXCLUDED.created_at,
                 country_code = EXCLUDED.country_code
         RETURNING id, created_at, user_id, phone, country_code,
                   (SELECT user_id FROM previous) AS previous_owner",
    )
    .bind(Uuid::new_v4())
    .bind(&phone.phone)
    .bind(user_id)
    .bind(phone.country_code)
    .fetch_one(executor)
    .await?;

    Ok(attached(
        phone_from_row(&row)?,
        user_id,
        row.try_get("previous_owner")?,
    ))
}

async fn create_password_with<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: UserId,
    hash: &str,
) -> Result<Password, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO passwords (created_at, user_id, hash) VALUES (NOW(), $1, $2)
         RETURNING id, created_at, user_id, hash",
    )
    .bind(user_id)
    .bind(hash)
    .fetch_one(executor)
    .await?;

    password_from_row(&row)
}

async fn create_session_with<'e, E: PgExecutor<'e>>(
    executor: E,
    session: &SessionRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (id, refresh_token, fingerprint, user_id, secret_id,
                               user_agent, created_at, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(session.id)
    .bind(&session.refresh_token)
    .bind(&session.fingerprint)
    .bind(session.user_id)
    .bind(session.secret_id)
    .bind(&session.user_agent)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Recompute statement over the users selected by `selector`, which binds `$1`.
///
/// One statement computes, conditionally upserts and reports, so concurrent
/// recomputes for overlapping users converge on the committed facts.
fn recompute_sql(selector: &str) -> String {
    format!(
        "WITH computed AS (
             SELECT u.id AS user_id,
                    u.created_at,
                    COALESCE(ARRAY_AGG(DISTINCT r.title ORDER BY r.title)
                             FILTER (WHERE r.title IS NOT NULL), '{{}}') AS roles,
                    COALESCE(ARRAY_AGG(DISTINCT p.phone ORDER BY p.phone)
                             FILTER (WHERE p.phone IS NOT NULL), '{{}}') AS phones,
                    COALESCE(ARRAY_AGG(DISTINCT e.email ORDER BY e.email)
                             FILTER (WHERE e.email IS NOT NULL), '{{}}') AS emails,
                    COALESCE(ARRAY_AGG(DISTINCT r.id ORDER BY r.id)
                             FILTER (WHERE r.id IS NOT NULL), '{{}}') AS role_ids
             FROM users u
             LEFT JOIN emails e ON e.user_id = u.id
             LEFT JOIN phones p ON p.user_id = u.id
             LEFT JOIN user_roles ur ON ur.user_id = u.id
             LEFT JOIN roles r ON r.id = ur.role_id
             WHERE {selector}
             GROUP BY u.id, u.created_at
         ),
         written AS (
             INSERT INTO user_views (user_id, created_at, roles, phones, emails, role_ids)
             SELECT user_id, created_at, roles, phones, emails, role_ids FROM computed
             ON CONFLICT (user_id) DO UPDATE
                 SET created_at = EXCLUDED.created_at,
                     roles = EXCLUDED.roles,
                     phones = EXCLUDED.phones,
                     emails = EXCLUDED.emails,
                     role_ids = EXCLUDED.role_ids
                 WHERE (user_views.created_at, user_views.roles, user_views.phones,
                        user_views.emails, user_views.role_ids)
                       IS DISTINCT FROM
                       (EXCLUDED.created_at, EXCLUDED.roles, EXCLUDED.phones,
                        EXCLUDED.emails, EXCLUDED.role_ids)
             RETURNING user_id
         )
         SELECT c.user_id, c.created_at, c.roles, c.phones, c.emails, c.role_ids,
                EXISTS (SELECT 1 FROM written w WHERE w.user_id = c.user_id) AS written
         FROM computed c
         ORDER BY c.user_id"
    )
}

fn recomputed_from_rows(rows: &[PgRow]) -> Result<Recomputed, sqlx::Error> {
    let mut recomputed = Recomputed::default();
    for row in rows {
        let view = view_from_row(row)?;
        if row.try_get::<bool, _>("written")? {
            recomputed.written.push(view.user_id);
        }
        recomputed.views.push(view);
    }
    Ok(recomputed)
}

fn push_view_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserViewFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_ids) = &filter.user_ids {
        builder.push(" AND user_id = ANY(");
        builder.push_bind(user_ids.clone());
        builder.push(")");
    }
    if let Some(role_id) = filter.role_id {
        builder.push(" AND ");
        builder.push_bind(role_id);
        builder.push(" = ANY(role_ids)");
    }
    if let Some(email) = &filter.email {
        builder.push(" AND ");
        builder.push_bind(email.clone());
        builder.push(" = ANY(emails)");
    }
    if let Some(phone) = &filter.phone {
        builder.push(" AND ");
        builder.push_bind(phone.clone());
        builder.push(" = ANY(phones)");
    }
}

/// PostgreSQL implementation of [`IdentityStore`]
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn health_check(&self) -> IdentityResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, new_user: &NewUser) -> IdentityResult<Registered> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO users (id, created_at) VALUES ($1, NOW()) RETURNING id, created_at",
        )
        .bind(Uuid::new_v4())
        .fetch_one(&mut *tx)
        .await?;
        let user = User {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
        };

        let email = match &new_user.email {
            Some(email) => Some(upsert_email_with(&mut *tx, user.id, email).await?),
            None => None,
        };
        let phone = match &new_user.phone {
            Some(phone) => Some(upsert_phone_with(&mut *tx, user.id, phone).await?),
            None => None,
        };
        let password = match &new_user.password_hash {
            Some(hash) => Some(create_password_with(&mut *tx, user.id, hash).await?),
            None => None,
        };

        tx.commit().await?;

        Ok(Registered {
            user,
            email,
            phone,
            password,
        })
    }

    async fn get_user(&self, id: UserId) -> IdentityResult<Option<User>> {
        let row = sqlx::query("SELECT id, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_user(&self, id: UserId) -> IdentityResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }

    async fn upsert_email(&self, user_id: UserId, email: &str) -> IdentityResult<Attached<Email>> {
        upsert_email_with(&self.pool, user_id, email)
            .await
            .map_err(owner_error)
    }

    async fn get_email(&self, email: &str) -> IdentityResult<Option<Email>> {
        let row = sqlx::query("SELECT id, created_at, user_id, email FROM emails WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(email_from_row).transpose()?)
    }

    async fn upsert_phone(
        &self,
        user_id: UserId,
        phone: &NewPhone,
    ) -> IdentityResult<Attached<Phone>> {
        upsert_phone_with(&self.pool, user_id, phone)
            .await
            .map_err(owner_error)
    }

    async fn get_phone(&self, phone: &str) -> IdentityResult<Option<Phone>> {
        let row = sqlx::query(
            "SELECT id, created_at, user_id, phone, country_code FROM phones WHERE phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(phone_from_row).transpose()?)
    }

    async fn create_password(&self, user_id: UserId, hash: &str) -> IdentityResult<Password> {
        create_password_with(&self.pool, user_id, hash)
            .await
            .map_err(owner_error)
    }

    async fn latest_password(&self, user_id: UserId) -> IdentityResult<Option<Password>> {
        let row = sqlx::query(
            "SELECT id, created_at, user_id, hash FROM passwords
             WHERE user_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(password_from_row).transpose()?)
    }

    async fn create_role(&self, title: &str) -> IdentityResult<Role> {
        let row = sqlx::query(
            "INSERT INTO roles (id, created_at, title) VALUES ($1, NOW(), $2)
             RETURNING id, created_at, title",
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                IdentityError::RoleAlreadyExist
            } else {
                e.into()
            }
        })?;

        Ok(role_from_row(&row)?)
    }

    async fn get_role(&self, id: RoleId) -> IdentityResult<Option<Role>> {
        let row = sqlx::query("SELECT id, created_at, title FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn get_role_by_title(&self, title: &str) -> IdentityResult<Option<Role>> {
        let row = sqlx::query("SELECT id, created_at, title FROM roles WHERE title = $1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn rename_role(&self, id: RoleId, title: &str) -> IdentityResult<Role> {
        let row = sqlx::query(
            "UPDATE roles SET title = $2 WHERE id = $1 RETURNING id, created_at, title",
        )
        .bind(id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                IdentityError::RoleAlreadyExist
            } else {
                e.into()
            }
        })?;

        match row {
            Some(row) => Ok(role_from_row(&row)?),
            None => Err(IdentityError::RoleNotFound),
        }
    }

    async fn create_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<UserRole> {
        let row = sqlx::query(
            "INSERT INTO user_roles (id, created_at, user_id, role_id) VALUES ($1, NOW(), $2, $3)
             RETURNING id, created_at, user_id, role_id",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return IdentityError::UserRoleAlreadyExist;
            }
            match foreign_key_violation(&e) {
                Some(constraint) if constraint.contains("role_id") => IdentityError::RoleNotFound,
                Some(_) => IdentityError::UserNotFound,
                None => e.into(),
            }
        })?;

        Ok(UserRole {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            user_id: row.try_get("user_id")?,
            role_id: row.try_get("role_id")?,
        })
    }

    async fn delete_user_role(&self, user_id: UserId, role_id: RoleId) -> IdentityResult<()> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::UserRoleNotFound);
        }
        Ok(())
    }

    async fn users_with_roles(&self, role_ids: &[RoleId]) -> IdentityResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT user_id FROM user_roles WHERE role_id = ANY($1) ORDER BY user_id",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut user_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            user_ids.push(row.try_get("user_id")?);
        }
        Ok(user_ids)
    }

    async fn create_session(&self, session: &SessionRecord) -> IdentityResult<()> {
        create_session_with(&self.pool, session)
            .await
            .map_err(owner_error)
    }

    async fn find_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT id, refresh_token, fingerprint, user_id, secret_id, user_agent,
                    created_at, expires_at
             FROM sessions
             WHERE user_id = $1 AND refresh_token = $2 AND fingerprint = $3 AND expires_at > $4",
        )
        .bind(user_id)
        .bind(refresh_token)
        .bind(fingerprint)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn rotate_session(&self, old: SessionId, new: &SessionRecord) -> IdentityResult<()> {
        let mut tx = self.pool.begin().await?;

        // the row lock serialises rotations; the loser sees zero rows
        let deleted = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(old)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(IdentityError::SessionNotFound);
        }

        create_session_with(&mut *tx, new)
            .await
            .map_err(owner_error)?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_secret(&self, secret: &Secret) -> IdentityResult<()> {
        sqlx::query("INSERT INTO secrets (id, created_at, key) VALUES ($1, $2, $3)")
            .bind(secret.id)
            .bind(secret.created_at)
            .bind(&secret.key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_secret(&self, id: SecretId) -> IdentityResult<Option<Secret>> {
        let row = sqlx::query("SELECT id, created_at, key FROM secrets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Secret {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                key: row.try_get("key")?,
            })),
            None => Ok(None),
        }
    }

    async fn recompute_user_views(&self, user_ids: &[UserId]) -> IdentityResult<Recomputed> {
        if user_ids.is_empty() {
            return Ok(Recomputed::default());
        }

        let sql = recompute_sql("u.id = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(recomputed_from_rows(&rows)?)
    }

    async fn recompute_role_views(&self, role_ids: &[RoleId]) -> IdentityResult<Recomputed> {
        if role_ids.is_empty() {
            return Ok(Recomputed::default());
        }

        let sql =
            recompute_sql("u.id IN (SELECT user_id FROM user_roles WHERE role_id = ANY($1))");
        let rows = sqlx::query(&sql)
            .bind(role_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(recomputed_from_rows(&rows)?)
    }

    async fn get_user_view(&self, user_id: UserId) -> IdentityResult<Option<UserView>> {
        let row = sqlx::query(
            "SELECT user_id, created_at, roles, phones, emails, role_ids
             FROM user_views WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(view_from_row).transpose()?)
    }

    async fn get_user_views(
        &self,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM user_views");
        push_view_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT user_id, created_at, roles, phones, emails, role_ids FROM user_views",
        );
        push_view_filter(&mut select, filter);
        select.push(" ORDER BY created_at, user_id LIMIT ");
        select.push_bind(pagination.limit());
        select.push(" OFFSET ");
        select.push_bind(pagination.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            views.push(view_from_row(row)?);
        }

        let total = u64::try_from(total).unwrap_or_default();
        Ok((views, PaginationInfo::new(pagination, total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recompute_sql_embeds_selector() {
        let sql = recompute_sql("u.id = ANY($1)");
        assert!(sql.contains("WHERE u.id = ANY($1)"));
        assert!(sql.contains("IS DISTINCT FROM"));
        // escaped braces render as the empty array literal
        assert!(sql.contains("'{}'"));
    }

    #[test]
    fn test_attached_ignores_same_owner() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(attached((), owner, Some(owner)).previous_owner, None);
        assert_eq!(attached((), owner, Some(other)).previous_owner, Some(other));
        assert_eq!(attached((), owner, None).previous_owner, None);
    }

    #[test]
    fn test_view_filter_sql() {
        let filter = UserViewFilter {
            role_id: Some(Uuid::new_v4()),
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM user_views");
        push_view_filter(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("$1 = ANY(role_ids)"));
        assert!(sql.contains("$2 = ANY(emails)"));
        assert!(!sql.contains("phones"));
    }
}
