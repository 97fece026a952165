//! Identity controller implementation.

use super::{Channel, CodeRequest, ContactProof, Mutation, RegisterRequest};
use crate::cache::DistributedCache;
use crate::config::IdentityConfig;
use crate::contact::{ConfirmationCodes, Subject, normalize_email, normalize_phone};
use crate::context::CallContext;
use crate::credentials::{
    Authenticator, BasicBackend, BearerBackend, CredentialBackend, Identity, Scheme,
    split_authorization,
};
use crate::db::{
    Email, IdentityStore, NewPhone, NewUser, Pagination, PaginationInfo, Password, Phone,
    Recomputed, Role, RoleId, UserId, UserRole, UserView, UserViewFilter,
};
use crate::errors::{IdentityError, IdentityResult, most_severe};
use crate::events::{Notification, Topic};
use crate::password::PasswordHasher;
use crate::projection::{ProjectionEngine, Repaired};
use crate::secrets::SecretStore;
use crate::session::{RenewRequest, Session, SessionManager};
use crate::token::TokenCodec;
use serde_json::json;
use std::sync::Arc;

fn views_changed(recomputed: &Recomputed) -> Option<Notification> {
    if recomputed.views.is_empty() {
        return None;
    }
    let user_ids: Vec<UserId> = recomputed.views.iter().map(|view| view.user_id).collect();
    Some(Notification::new(
        Topic::UserViewsChanged,
        json!({ "user_ids": user_ids }),
    ))
}

/// Announce the views a read had to rewrite in the store
fn announce<T>(read: Repaired<T>) -> Mutation<T> {
    let (value, repaired) = read.into_parts();
    let notification = (!repaired.is_empty()).then(|| {
        Notification::new(
            Topic::UserViewsChanged,
            json!({ "user_ids": repaired }),
        )
    });
    Mutation::new(value).notify_opt(notification)
}

/// Affected users of a contact move: the new owner, then the previous one
fn owners(user_id: UserId, previous_owner: Option<UserId>) -> Vec<UserId> {
    let mut affected = vec![user_id];
    affected.extend(previous_owner);
    affected
}

/// Identity controller
pub struct IdentityController {
    store: Arc<dyn IdentityStore>,
    codes: ConfirmationCodes,
    hasher: PasswordHasher,
    projection: Arc<ProjectionEngine>,
    secrets: Arc<SecretStore>,
    sessions: SessionManager,
    authenticator: Authenticator,
    admin_role: String,
}

impl IdentityController {
    /// Build the controller and every component it drives
    ///
    /// # Arguments
    ///
    /// * `config` - Identity configuration
    /// * `store` - Durable identity store
    /// * `cache` - Distributed cache shared by all instances
    pub fn new(
        config: &IdentityConfig,
        store: Arc<dyn IdentityStore>,
        cache: Arc<dyn DistributedCache>,
    ) -> IdentityResult<Self> {
        let codes = ConfirmationCodes::new(cache.clone(), config.confirmation_code_ttl)
            .with_max_attempts(config.confirmation_code_max_attempts);
        let hasher = PasswordHasher::new(&config.password)?;
        let projection = Arc::new(ProjectionEngine::new(
            store.clone(),
            cache.clone(),
            config.user_view_ttl,
        ));
        let secrets = Arc::new(SecretStore::new(cache, store.clone(), config.secrets));
        let codec = TokenCodec::new(config.admin_role.clone());

        let sessions = SessionManager::new(
            store.clone(),
            secrets.clone(),
            projection.clone(),
            codec.clone(),
            config.access_token_lifetime,
            config.refresh_token_lifetime(),
        )?;

        let authenticator = Authenticator::new([
            CredentialBackend::Basic(BasicBackend::new(
                store.clone(),
                codes.clone(),
                hasher.clone(),
                projection.clone(),
                config.admin_role.clone(),
            )),
            CredentialBackend::Bearer(BearerBackend::new(secrets.clone(), codec)),
        ]);

        Ok(Self {
            store,
            codes,
            hasher,
            projection,
            secrets,
            sessions,
            authenticator,
            admin_role: config.admin_role.clone(),
        })
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    pub fn projection(&self) -> &ProjectionEngine {
        &self.projection
    }

    pub async fn health_check(&self, ctx: &CallContext) -> IdentityResult<()> {
        ctx.run(self.store.health_check()).await
    }

    /// Register a user with confirmed contacts and an optional password.
    ///
    /// Every input is checked before anything is written; when several checks
    /// fail the most severe failure is reported. The durable writes form one
    /// transaction.
    ///
    /// # Errors
    ///
    /// * `IdentityError::MinimumOneFieldRequired` - Neither email nor phone given
    /// * `IdentityError::PasswordRequired` - Password given but empty
    /// * Contact normalization and confirmation-code errors
    pub async fn register_user(
        &self,
        ctx: &CallContext,
        request: &RegisterRequest,
    ) -> IdentityResult<Mutation<UserView>> {
        if request.email.is_none() && request.phone.is_none() {
            return Err(IdentityError::MinimumOneFieldRequired);
        }

        let mut errors = Vec::new();

        let email = match &request.email {
            Some(proof) => match self.confirm_email(ctx, proof).await {
                Ok(email) => Some(email),
                Err(e) => {
                    errors.push(e);
                    None
                }
            },
            None => None,
        };

        let phone = match &request.phone {
            Some(proof) => match self.confirm_phone(ctx, proof).await {
                Ok(phone) => Some(phone),
                Err(e) => {
                    errors.push(e);
                    None
                }
            },
            None => None,
        };

        if matches!(&request.password, Some(password) if password.is_empty()) {
            errors.push(IdentityError::PasswordRequired);
        }

        if let Some(error) = most_severe(errors) {
            return Err(error);
        }

        let password_hash = match &request.password {
            Some(password) => Some(self.hasher.hash(password).await?),
            None => None,
        };

        let registered = ctx
            .run(self.store.create_user(&NewUser {
                email,
                phone,
                password_hash,
            }))
            .await?;
        let user_id = registered.user.id;

        let mut affected = vec![user_id];
        let mut notifications = vec![Notification::new(
            Topic::UserCreated,
            json!({ "user_id": user_id }),
        )];
        if let Some(email) = &registered.email {
            affected.extend(email.previous_owner);
            notifications.push(Notification::new(
                Topic::EmailAttached,
                json!({
                    "user_id": user_id,
                    "email": email.record.email,
                    "previous_owner": email.previous_owner,
                }),
            ));
        }
        if let Some(phone) = &registered.phone {
            affected.extend(phone.previous_owner);
            notifications.push(Notification::new(
                Topic::PhoneAttached,
                json!({
                    "user_id": user_id,
                    "phone": phone.record.phone,
                    "previous_owner": phone.previous_owner,
                }),
            ));
        }
        if let Some(password) = &registered.password {
            notifications.push(Notification::new(
                Topic::PasswordCreated,
                json!({ "user_id": user_id, "password_id": password.id }),
            ));
        }

        let recomputed = self.projection.recompute_for_users(ctx, &affected).await?;
        let view = recomputed
            .views
            .iter()
            .find(|view| view.user_id == user_id)
            .cloned()
            .ok_or(IdentityError::UserNotFound)?;

        Ok(Mutation {
            value: view,
            notifications,
        }
        .notify_opt(views_changed(&recomputed)))
    }

    /// Attach a confirmed email, moving it away from its current owner
    pub async fn attach_email(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        proof: &ContactProof,
    ) -> IdentityResult<Mutation<Email>> {
        let email = self.confirm_email(ctx, proof).await?;
        let attached = ctx.run(self.store.upsert_email(user_id, &email)).await?;

        let recomputed = self
            .projection
            .recompute_for_users(ctx, &owners(user_id, attached.previous_owner))
            .await?;

        Ok(Mutation::new(attached.record.clone())
            .notify(Notification::new(
                Topic::EmailAttached,
                json!({
                    "user_id": user_id,
                    "email": attached.record.email,
                    "previous_owner": attached.previous_owner,
                }),
            ))
            .notify_opt(views_changed(&recomputed)))
    }

    /// Attach a confirmed phone, moving it away from its current owner
    pub async fn attach_phone(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        proof: &ContactProof,
    ) -> IdentityResult<Mutation<Phone>> {
        let phone = self.confirm_phone(ctx, proof).await?;
        let attached = ctx.run(self.store.upsert_phone(user_id, &phone)).await?;

        let recomputed = self
            .projection
            .recompute_for_users(ctx, &owners(user_id, attached.previous_owner))
            .await?;

        Ok(Mutation::new(attached.record.clone())
            .notify(Notification::new(
                Topic::PhoneAttached,
                json!({
                    "user_id": user_id,
                    "phone": attached.record.phone,
                    "previous_owner": attached.previous_owner,
                }),
            ))
            .notify_opt(views_changed(&recomputed)))
    }

    /// Append a new password; it supersedes every earlier one
    pub async fn add_password(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        password: &str,
    ) -> IdentityResult<Mutation<Password>> {
        if password.is_empty() {
            return Err(IdentityError::PasswordRequired);
        }

        let hash = self.hasher.hash(password).await?;
        let created = ctx.run(self.store.create_password(user_id, &hash)).await?;

        Ok(Mutation::new(created.clone()).notify(Notification::new(
            Topic::PasswordCreated,
            json!({ "user_id": user_id, "password_id": created.id }),
        )))
    }

    /// Delete a user and everything it owns
    pub async fn delete_user(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> IdentityResult<Mutation<()>> {
        ctx.run(self.store.delete_user(user_id)).await?;
        self.projection.forget(ctx, &[user_id]).await?;

        Ok(Mutation::new(())
            .notify(Notification::new(
                Topic::UserDeleted,
                json!({ "user_id": user_id }),
            ))
            .notify(Notification::new(
                Topic::UserViewsChanged,
                json!({ "user_ids": [user_id] }),
            )))
    }

    /// Create a role (`RoleAlreadyExist` on duplicate title)
    pub async fn create_role(
        &self,
        ctx: &CallContext,
        title: &str,
    ) -> IdentityResult<Mutation<Role>> {
        let role = ctx.run(self.store.create_role(title.trim())).await?;

        Ok(Mutation::new(role.clone()).notify(Notification::new(
            Topic::RoleCreated,
            json!({ "role_id": role.id, "title": role.title }),
        )))
    }

    /// Make sure the admin role exists
    pub async fn bootstrap_admin_role(&self, ctx: &CallContext) -> IdentityResult<Mutation<Role>> {
        if let Some(role) = ctx
            .run(self.store.get_role_by_title(&self.admin_role))
            .await?
        {
            return Ok(Mutation::new(role));
        }

        match self.create_role(ctx, &self.admin_role).await {
            Ok(mutation) => {
                log::info!("Created admin role '{}'", self.admin_role);
                Ok(mutation)
            }
            Err(IdentityError::RoleAlreadyExist) => ctx
                .run(self.store.get_role_by_title(&self.admin_role))
                .await?
                .map(Mutation::new)
                .ok_or(IdentityError::RoleNotFound),
            Err(e) => Err(e),
        }
    }

    /// Change a role's title and refresh the views of its current members
    pub async fn rename_role(
        &self,
        ctx: &CallContext,
        role_id: RoleId,
        title: &str,
    ) -> IdentityResult<Mutation<Role>> {
        let role = ctx.run(self.store.rename_role(role_id, title.trim())).await?;
        let recomputed = self.projection.recompute_for_roles(ctx, &[role_id]).await?;

        Ok(Mutation::new(role.clone())
            .notify(Notification::new(
                Topic::RoleRenamed,
                json!({ "role_id": role.id, "title": role.title }),
            ))
            .notify_opt(views_changed(&recomputed)))
    }

    /// Assign a role to a user
    pub async fn assign_role(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<Mutation<UserRole>> {
        let assignment = ctx
            .run(self.store.create_user_role(user_id, role_id))
            .await?;
        let recomputed = self.projection.recompute_for_users(ctx, &[user_id]).await?;

        Ok(Mutation::new(assignment)
            .notify(Notification::new(
                Topic::UserRoleCreated,
                json!({ "user_id": user_id, "role_id": role_id }),
            ))
            .notify_opt(views_changed(&recomputed)))
    }

    /// Revoke a role from a user
    pub async fn revoke_role(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<Mutation<()>> {
        ctx.run(self.store.delete_user_role(user_id, role_id))
            .await?;
        let recomputed = self.projection.recompute_for_users(ctx, &[user_id]).await?;

        Ok(Mutation::new(())
            .notify(Notification::new(
                Topic::UserRoleDeleted,
                json!({ "user_id": user_id, "role_id": role_id }),
            ))
            .notify_opt(views_changed(&recomputed)))
    }

    /// Issue a confirmation code for delivery.
    ///
    /// The code itself only travels in the notification, for the delivery
    /// service; the caller gets the normalized subject back.
    pub async fn request_code(
        &self,
        ctx: &CallContext,
        request: &CodeRequest,
    ) -> IdentityResult<Mutation<Subject>> {
        let subject = match request.channel {
            Channel::Email => Subject::Email(normalize_email(&request.value)?),
            Channel::Phone => Subject::Phone(normalize_phone(&request.value)?.e164),
        };
        let code = self.codes.issue(ctx, &subject).await?;

        Ok(Mutation::new(subject.clone()).notify(Notification::new(
            Topic::ConfirmationCodeIssued,
            json!({
                "channel": request.channel,
                "subject": subject.value(),
                "code": code,
            }),
        )))
    }

    /// Authenticate an `Authorization` header value
    pub async fn authenticate(
        &self,
        ctx: &CallContext,
        authorization: &str,
    ) -> IdentityResult<Mutation<Identity>> {
        Ok(announce(self.authenticator.authenticate(ctx, authorization).await?))
    }

    /// Exchange Basic credentials for a new session
    ///
    /// # Errors
    ///
    /// * `IdentityError::UnsupportedScheme` - Any scheme other than Basic
    /// * Any Basic backend error
    pub async fn login(
        &self,
        ctx: &CallContext,
        authorization: &str,
        fingerprint: &str,
        user_agent: &str,
    ) -> IdentityResult<Mutation<Session>> {
        let (scheme, _) = split_authorization(authorization)?;
        if scheme != Scheme::Basic {
            return Err(IdentityError::UnsupportedScheme(scheme.to_string()));
        }

        let (identity, repaired) = self
            .authenticator
            .authenticate(ctx, authorization)
            .await?
            .into_parts();
        let session = self
            .sessions
            .create_session(ctx, identity.user_id, fingerprint, user_agent)
            .await?;
        Ok(announce(session.with_repaired(repaired)))
    }

    pub async fn renew_session(
        &self,
        ctx: &CallContext,
        request: &RenewRequest,
    ) -> IdentityResult<Mutation<Session>> {
        Ok(announce(self.sessions.renew_session(ctx, request).await?))
    }

    /// Cached view of one user (`UserNotFound` if the user does not exist)
    pub async fn get_user_view(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> IdentityResult<Mutation<UserView>> {
        let (view, repaired) = self
            .projection
            .get_user_view(ctx, user_id)
            .await?
            .into_parts();
        let view = view.ok_or(IdentityError::UserNotFound)?;
        Ok(announce(Repaired {
            value: view,
            repaired,
        }))
    }

    pub async fn get_user_views(
        &self,
        ctx: &CallContext,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)> {
        self.projection.get_user_views(ctx, filter, pagination).await
    }

    async fn confirm_email(
        &self,
        ctx: &CallContext,
        proof: &ContactProof,
    ) -> IdentityResult<String> {
        let email = normalize_email(&proof.value)?;
        self.codes
            .verify(ctx, &Subject::Email(email.clone()), &proof.code)
            .await?;
        Ok(email)
    }

    async fn confirm_phone(
        &self,
        ctx: &CallContext,
        proof: &ContactProof,
    ) -> IdentityResult<NewPhone> {
        let phone = normalize_phone(&proof.value)?;
        self.codes
            .verify(ctx, &Subject::Phone(phone.e164.clone()), &proof.code)
            .await?;
        Ok(phone.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::PasswordConfig;
    use crate::credentials::basic::encode_credentials;
    use crate::db::MemoryIdentityStore;

    struct Fixture {
        controller: IdentityController,
        store: Arc<MemoryIdentityStore>,
    }

    fn config() -> IdentityConfig {
        IdentityConfig {
            password: PasswordConfig {
                pepper: "pepper-pepper-pepper".to_string(),
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..IdentityConfig::development()
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryIdentityStore::new());
        let controller =
            IdentityController::new(&config(), store.clone(), Arc::new(MemoryCache::new()))
                .unwrap();
        Fixture { controller, store }
    }

    async fn proof(controller: &IdentityController, channel: Channel, value: &str) -> ContactProof {
        let mutation = controller
            .request_code(
                &CallContext::new(),
                &CodeRequest {
                    channel,
                    value: value.to_string(),
                },
            )
            .await
            .unwrap();
        let code = mutation.notifications[0].envelope.data["code"]
            .as_str()
            .unwrap()
            .to_string();
        ContactProof {
            value: value.to_string(),
            code,
        }
    }

    fn topics<T>(mutation: &Mutation<T>) -> Vec<Topic> {
        mutation
            .notifications
            .iter()
            .map(|notification| notification.topic)
            .collect()
    }

    #[tokio::test]
    async fn test_register_requires_a_contact() {
        let fixture = fixture();
        let err = fixture
            .controller
            .register_user(
                &CallContext::new(),
                &RegisterRequest {
                    password: Some("password".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MinimumOneFieldRequired));
    }

    #[tokio::test]
    async fn test_register_reports_first_validation_failure() {
        let fixture = fixture();
        let err = fixture
            .controller
            .register_user(
                &CallContext::new(),
                &RegisterRequest {
                    email: Some(ContactProof {
                        value: "not-an-email".to_string(),
                        code: "000000".to_string(),
                    }),
                    phone: Some(ContactProof {
                        value: "12".to_string(),
                        code: "000000".to_string(),
                    }),
                    password: Some(String::new()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::IncorrectEmail));
    }

    #[tokio::test]
    async fn test_register_with_wrong_code_writes_nothing() {
        let fixture = fixture();
        let mut email = proof(&fixture.controller, Channel::Email, "a@b.com").await;
        email.code = if email.code == "000000" { "111111" } else { "000000" }.to_string();

        let err = fixture
            .controller
            .register_user(
                &CallContext::new(),
                &RegisterRequest {
                    email: Some(email),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::IncorrectEmailCode));
        assert!(fixture.store.get_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let fixture = fixture();
        let ctx = CallContext::new();
        let email = proof(&fixture.controller, Channel::Email, "a@b.com").await;
        let phone = proof(&fixture.controller, Channel::Phone, "+15551234567").await;

        let mutation = fixture
            .controller
            .register_user(
                &ctx,
                &RegisterRequest {
                    email: Some(email),
                    phone: Some(phone),
                    password: Some("long enough password".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            topics(&mutation),
            vec![
                Topic::UserCreated,
                Topic::EmailAttached,
                Topic::PhoneAttached,
                Topic::PasswordCreated,
                Topic::UserViewsChanged,
            ]
        );
        let view = mutation.value;
        assert_eq!(view.emails, vec!["a@b.com"]);
        assert_eq!(view.phones, vec!["+15551234567"]);

        let session = fixture
            .controller
            .login(
                &ctx,
                &format!("Basic {}", encode_credentials("a@b.com", "long enough password")),
                "fp",
                "agent/1",
            )
            .await
            .unwrap()
            .value;
        assert_eq!(session.record.user_id, view.user_id);

        let identity = fixture
            .controller
            .authenticate(&ctx, &format!("Bearer {}", session.access_token))
            .await
            .unwrap();
        assert!(identity.notifications.is_empty());
        assert_eq!(identity.value.user_id, view.user_id);
    }

    #[tokio::test]
    async fn test_login_rejects_bearer() {
        let fixture = fixture();
        let err = fixture
            .controller
            .login(&CallContext::new(), "Bearer abc", "fp", "agent/1")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn test_add_password_requires_value() {
        let fixture = fixture();
        let err = fixture
            .controller
            .add_password(&CallContext::new(), uuid::Uuid::new_v4(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::PasswordRequired));
    }

    #[tokio::test]
    async fn test_request_code_normalizes_subject() {
        let fixture = fixture();
        let mutation = fixture
            .controller
            .request_code(
                &CallContext::new(),
                &CodeRequest {
                    channel: Channel::Email,
                    value: " A@B.COM ".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(mutation.value, Subject::Email("a@b.com".to_string()));
        assert_eq!(topics(&mutation), vec![Topic::ConfirmationCodeIssued]);
        assert_eq!(mutation.notifications[0].envelope.data["channel"], "email");
    }

    #[tokio::test]
    async fn test_role_lifecycle_refreshes_views() {
        let fixture = fixture();
        let ctx = CallContext::new();
        let email = proof(&fixture.controller, Channel::Email, "a@b.com").await;
        let view = fixture
            .controller
            .register_user(
                &ctx,
                &RegisterRequest {
                    email: Some(email),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;

        let role = fixture.controller.create_role(&ctx, "ops").await.unwrap().value;
        let assigned = fixture
            .controller
            .assign_role(&ctx, view.user_id, role.id)
            .await
            .unwrap();
        assert_eq!(
            topics(&assigned),
            vec![Topic::UserRoleCreated, Topic::UserViewsChanged]
        );
        let cached = fixture
            .controller
            .get_user_view(&ctx, view.user_id)
            .await
            .unwrap()
            .value;
        assert_eq!(cached.roles, vec!["ops"]);

        fixture
            .controller
            .rename_role(&ctx, role.id, "operators")
            .await
            .unwrap();
        let cached = fixture
            .controller
            .get_user_view(&ctx, view.user_id)
            .await
            .unwrap()
            .value;
        assert_eq!(cached.roles, vec!["operators"]);

        fixture
            .controller
            .revoke_role(&ctx, view.user_id, role.id)
            .await
            .unwrap();
        let cached = fixture
            .controller
            .get_user_view(&ctx, view.user_id)
            .await
            .unwrap()
            .value;
        assert!(cached.roles.is_empty());
        assert!(cached.role_ids.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_role_is_idempotent() {
        let fixture = fixture();
        let ctx = CallContext::new();

        let first = fixture.controller.bootstrap_admin_role(&ctx).await.unwrap();
        assert_eq!(topics(&first), vec![Topic::RoleCreated]);

        let second = fixture.controller.bootstrap_admin_role(&ctx).await.unwrap();
        assert!(second.notifications.is_empty());
        assert_eq!(first.value.id, second.value.id);
    }

    #[tokio::test]
    async fn test_delete_user_forgets_view() {
        let fixture = fixture();
        let ctx = CallContext::new();
        let email = proof(&fixture.controller, Channel::Email, "a@b.com").await;
        let view = fixture
            .controller
            .register_user(
                &ctx,
                &RegisterRequest {
                    email: Some(email),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .value;

        let deleted = fixture.controller.delete_user(&ctx, view.user_id).await.unwrap();
        assert_eq!(
            topics(&deleted),
            vec![Topic::UserDeleted, Topic::UserViewsChanged]
        );
        assert!(matches!(
            fixture
                .controller
                .get_user_view(&ctx, view.user_id)
                .await
                .unwrap_err(),
            IdentityError::UserNotFound
        ));
    }
}
