//! In-process [`IdentityStore`] used by tests and local development.
//!
//! All state sits behind one mutex that is never held across an await, so
//! every method is atomic in the same way a single SQL statement is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::models::{
    Attached, Email, NewPhone, NewUser, Pagination, PaginationInfo, Password, PasswordId, Phone,
    Recomputed, Registered, Role, RoleId, SessionId, SessionRecord, User, UserId, UserRole,
    UserView, UserViewFilter,
};
use super::repository::IdentityStore;
use crate::errors::{IdentityError, IdentityResult};
use crate::secrets::{Secret, SecretId};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    emails: HashMap<String, Email>,
    phones: HashMap<String, Phone>,
    passwords: Vec<Password>,
    last_password_id: PasswordId,
    roles: HashMap<RoleId, Role>,
    user_roles: Vec<UserRole>,
    sessions: HashMap<SessionId, SessionRecord>,
    secrets: HashMap<SecretId, Secret>,
    views: HashMap<UserId, UserView>,
}

impl State {
    fn require_user(&self, user_id: UserId) -> IdentityResult<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(IdentityError::UserNotFound)
        }
    }

    fn attach_email(&mut self, user_id: UserId, email: &str) -> Attached<Email> {
        let now = Utc::now();
        let entry = self.emails.entry(email.to_string()).or_insert_with(|| Email {
            id: Uuid::new_v4(),
            created_at: now,
            user_id,
            email: email.to_string(),
        });
        let previous = entry.user_id;
        entry.user_id = user_id;
        entry.created_at = now;
        Attached {
            record: entry.clone(),
            previous_owner: Some(previous).filter(|previous| *previous != user_id),
        }
    }

    fn attach_phone(&mut self, user_id: UserId, phone: &NewPhone) -> Attached<Phone> {
        let now = Utc::now();
        let entry = self
            .phones
            .entry(phone.phone.clone())
            .or_insert_with(|| Phone {
                id: Uuid::new_v4(),
                created_at: now,
                user_id,
                phone: phone.phone.clone(),
                country_code: phone.country_code,
            });
        let previous = entry.user_id;
        entry.user_id = user_id;
        entry.created_at = now;
        entry.country_code = phone.country_code;
        Attached {
            record: entry.clone(),
            previous_owner: Some(previous).filter(|previous| *previous != user_id),
        }
    }

    fn append_password(&mut self, user_id: UserId, hash: &str) -> Password {
        self.last_password_id += 1;
        let password = Password {
            id: self.last_password_id,
            created_at: Utc::now(),
            user_id,
            hash: hash.to_string(),
        };
        self.passwords.push(password.clone());
        password
    }

    fn compute_view(&self, user: &User) -> UserView {
        let assigned: Vec<&Role> = self
            .user_roles
            .iter()
            .filter(|assignment| assignment.user_id == user.id)
            .filter_map(|assignment| self.roles.get(&assignment.role_id))
            .collect();

        let roles: BTreeSet<String> = assigned.iter().map(|role| role.title.clone()).collect();
        let role_ids: BTreeSet<RoleId> = assigned.iter().map(|role| role.id).collect();
        let emails: BTreeSet<String> = self
            .emails
            .values()
            .filter(|email| email.user_id == user.id)
            .map(|email| email.email.clone())
            .collect();
        let phones: BTreeSet<String> = self
            .phones
            .values()
            .filter(|phone| phone.user_id == user.id)
            .map(|phone| phone.phone.clone())
            .collect();

        UserView {
            user_id: user.id,
            created_at: user.created_at,
            roles: roles.into_iter().collect(),
            phones: phones.into_iter().collect(),
            emails: emails.into_iter().collect(),
            role_ids: role_ids.into_iter().collect(),
        }
    }

    fn recompute(&mut self, user_ids: impl IntoIterator<Item = UserId>) -> Recomputed {
        let selected: BTreeSet<UserId> = user_ids.into_iter().collect();
        let mut recomputed = Recomputed::default();

        for user_id in selected {
            let Some(user) = self.users.get(&user_id) else {
                continue;
            };
            let view = self.compute_view(user);
            if self.views.get(&user_id) != Some(&view) {
                self.views.insert(user_id, view.clone());
                recomputed.written.push(user_id);
            }
            recomputed.views.push(view);
        }

        recomputed
    }
}

fn matches_filter(view: &UserView, filter: &UserViewFilter) -> bool {
    if let Some(user_ids) = &filter.user_ids
        && !user_ids.contains(&view.user_id)
    {
        return false;
    }
    if let Some(role_id) = filter.role_id
        && !view.role_ids.contains(&role_id)
    {
        return false;
    }
    if let Some(email) = &filter.email
        && !view.emails.contains(email)
    {
        return false;
    }
    if let Some(phone) = &filter.phone
        && !view.phones.contains(phone)
    {
        return false;
    }
    true
}

/// Counters exposed for assertions on store traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub secret_reads: u64,
    pub view_writes: u64,
}

/// In-memory identity store
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    yield_after_session_lookup: AtomicBool,
    secret_reads: AtomicU64,
    view_writes: AtomicU64,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a store error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Yield to the scheduler after each session lookup, so concurrent
    /// renewals interleave between lookup and rotation
    pub fn yield_after_session_lookup(&self, enabled: bool) {
        self.yield_after_session_lookup
            .store(enabled, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            secret_reads: self.secret_reads.load(Ordering::SeqCst),
            view_writes: self.view_writes.load(Ordering::SeqCst),
        }
    }

    fn lock(&self) -> IdentityResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| IdentityError::Store("identity store lock poisoned".to_string()))
    }

    fn lock_for_write(&self) -> IdentityResult<MutexGuard<'_, State>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IdentityError::Store("write rejected".to_string()));
        }
        self.lock()
    }

    fn record_writes(&self, recomputed: &Recomputed) {
        self.view_writes
            .fetch_add(recomputed.written.len() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn health_check(&self) -> IdentityResult<()> {
        self.lock().map(|_| ())
    }

    async fn create_user(&self, new_user: &NewUser) -> IdentityResult<Registered> {
        let mut state = self.lock_for_write()?;

        let user = User {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());

        let email = new_user
            .email
            .as_deref()
            .map(|email| state.attach_email(user.id, email));
        let phone = new_user
            .phone
            .as_ref()
            .map(|phone| state.attach_phone(user.id, phone));
        let password = new_user
            .password_hash
            .as_deref()
            .map(|hash| state.append_password(user.id, hash));

        Ok(Registered {
            user,
            email,
            phone,
            password,
        })
    }

    async fn get_user(&self, id: UserId) -> IdentityResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn delete_user(&self, id: UserId) -> IdentityResult<()> {
        let mut state = self.lock_for_write()?;
        if state.users.remove(&id).is_none() {
            return Err(IdentityError::UserNotFound);
        }

        state.emails.retain(|_, email| email.user_id != id);
        state.phones.retain(|_, phone| phone.user_id != id);
        state.passwords.retain(|password| password.user_id != id);
        state.user_roles.retain(|assignment| assignment.user_id != id);
        state.sessions.retain(|_, session| session.user_id != id);
        state.views.remove(&id);
        Ok(())
    }

    async fn upsert_email(&self, user_id: UserId, email: &str) -> IdentityResult<Attached<Email>> {
        let mut state = self.lock_for_write()?;
        state.require_user(user_id)?;
        Ok(state.attach_email(user_id, email))
    }

    async fn get_email(&self, email: &str) -> IdentityResult<Option<Email>> {
        Ok(self.lock()?.emails.get(email).cloned())
    }

    async fn upsert_phone(
        &self,
        user_id: UserId,
        phone: &NewPhone,
    ) -> IdentityResult<Attached<Phone>> {
        let mut state = self.lock_for_write()?;
        state.require_user(user_id)?;
        Ok(state.attach_phone(user_id, phone))
    }

    async fn get_phone(&self, phone: &str) -> IdentityResult<Option<Phone>> {
        Ok(self.lock()?.phones.get(phone).cloned())
    }

    async fn create_password(&self, user_id: UserId, hash: &str) -> IdentityResult<Password> {
        let mut state = self.lock_for_write()?;
        state.require_user(user_id)?;
        Ok(state.append_password(user_id, hash))
    }

    async fn latest_password(&self, user_id: UserId) -> IdentityResult<Option<Password>> {
        Ok(self
            .lock()?
            .passwords
            .iter()
            .filter(|password| password.user_id == user_id)
            .max_by_key(|password| password.id)
            .cloned())
    }

    async fn create_role(&self, title: &str) -> IdentityResult<Role> {
        let mut state = self.lock_for_write()?;
        if state.roles.values().any(|role| role.title == title) {
            return Err(IdentityError::RoleAlreadyExist);
        }

        let role = Role {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: title.to_string(),
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> IdentityResult<Option<Role>> {
        Ok(self.lock()?.roles.get(&id).cloned())
    }

    async fn get_role_by_title(&self, title: &str) -> IdentityResult<Option<Role>> {
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|role| role.title == title)
            .cloned())
    }

    async fn rename_role(&self, id: RoleId, title: &str) -> IdentityResult<Role> {
        let mut state = self.lock_for_write()?;
        if state
            .roles
            .values()
            .any(|role| role.title == title && role.id != id)
        {
            return Err(IdentityError::RoleAlreadyExist);
        }

        let role = state.roles.get_mut(&id).ok_or(IdentityError::RoleNotFound)?;
        role.title = title.to_string();
        Ok(role.clone())
    }

    async fn create_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<UserRole> {
        let mut state = self.lock_for_write()?;
        state.require_user(user_id)?;
        if !state.roles.contains_key(&role_id) {
            return Err(IdentityError::RoleNotFound);
        }
        if state
            .user_roles
            .iter()
            .any(|assignment| assignment.user_id == user_id && assignment.role_id == role_id)
        {
            return Err(IdentityError::UserRoleAlreadyExist);
        }

        let assignment = UserRole {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_id,
            role_id,
        };
        state.user_roles.push(assignment.clone());
        Ok(assignment)
    }

    async fn delete_user_role(&self, user_id: UserId, role_id: RoleId) -> IdentityResult<()> {
        let mut state = self.lock_for_write()?;
        let before = state.user_roles.len();
        state
            .user_roles
            .retain(|assignment| !(assignment.user_id == user_id && assignment.role_id == role_id));

        if state.user_roles.len() == before {
            return Err(IdentityError::UserRoleNotFound);
        }
        Ok(())
    }

    async fn users_with_roles(&self, role_ids: &[RoleId]) -> IdentityResult<Vec<UserId>> {
        let state = self.lock()?;
        let users: BTreeSet<UserId> = state
            .user_roles
            .iter()
            .filter(|assignment| role_ids.contains(&assignment.role_id))
            .map(|assignment| assignment.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn create_session(&self, session: &SessionRecord) -> IdentityResult<()> {
        let mut state = self.lock_for_write()?;
        state.require_user(session.user_id)?;
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<SessionRecord>> {
        let found = self
            .lock()?
            .sessions
            .values()
            .find(|session| {
                session.user_id == user_id
                    && session.refresh_token == refresh_token
                    && session.fingerprint == fingerprint
                    && session.expires_at > now
            })
            .cloned();

        if self.yield_after_session_lookup.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(found)
    }

    async fn rotate_session(&self, old: SessionId, new: &SessionRecord) -> IdentityResult<()> {
        let mut state = self.lock_for_write()?;
        if !state.sessions.contains_key(&old) {
            return Err(IdentityError::SessionNotFound);
        }
        state.require_user(new.user_id)?;
        state.sessions.remove(&old);
        state.sessions.insert(new.id, new.clone());
        Ok(())
    }

    async fn insert_secret(&self, secret: &Secret) -> IdentityResult<()> {
        self.lock_for_write()?
            .secrets
            .insert(secret.id, secret.clone());
        Ok(())
    }

    async fn get_secret(&self, id: SecretId) -> IdentityResult<Option<Secret>> {
        self.secret_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock()?.secrets.get(&id).cloned())
    }

    async fn recompute_user_views(&self, user_ids: &[UserId]) -> IdentityResult<Recomputed> {
        let recomputed = self.lock_for_write()?.recompute(user_ids.iter().copied());
        self.record_writes(&recomputed);
        Ok(recomputed)
    }

    async fn recompute_role_views(&self, role_ids: &[RoleId]) -> IdentityResult<Recomputed> {
        let mut state = self.lock_for_write()?;
        let members: Vec<UserId> = state
            .user_roles
            .iter()
            .filter(|assignment| role_ids.contains(&assignment.role_id))
            .map(|assignment| assignment.user_id)
            .collect();
        let recomputed = state.recompute(members);
        drop(state);

        self.record_writes(&recomputed);
        Ok(recomputed)
    }

    async fn get_user_view(&self, user_id: UserId) -> IdentityResult<Option<UserView>> {
        Ok(self.lock()?.views.get(&user_id).cloned())
    }

    async fn get_user_views(
        &self,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)> {
        let state = self.lock()?;
        let mut matching: Vec<&UserView> = state
            .views
            .values()
            .filter(|view| matches_filter(view, filter))
            .collect();
        matching.sort_by_key(|view| (view.created_at, view.user_id));

        let total = matching.len() as u64;
        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let views = matching
            .into_iter()
            .skip(offset)
            .take(pagination.per_page as usize)
            .cloned()
            .collect();

        Ok((views, PaginationInfo::new(pagination, total)))
    }
}
