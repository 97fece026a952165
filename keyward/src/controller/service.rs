//! Identity service: the controller plus notification publication.

use super::{CodeRequest, ContactProof, IdentityController, Mutation, RegisterRequest};
use crate::contact::Subject;
use crate::context::CallContext;
use crate::credentials::Identity;
use crate::db::{
    Email, Pagination, PaginationInfo, Password, Phone, Role, RoleId, UserId, UserRole, UserView,
    UserViewFilter,
};
use crate::errors::IdentityResult;
use crate::events::EventDispatcher;
use crate::session::{RenewRequest, Session};

/// Entry point used by transport layers
pub struct IdentityService {
    controller: IdentityController,
    dispatcher: EventDispatcher,
}

impl IdentityService {
    pub fn new(controller: IdentityController, dispatcher: EventDispatcher) -> Self {
        Self {
            controller,
            dispatcher,
        }
    }

    pub fn controller(&self) -> &IdentityController {
        &self.controller
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Publish the notifications of a successful write, or of a read that
    /// repaired stored views
    fn commit<T>(&self, operation: &str, result: IdentityResult<Mutation<T>>) -> IdentityResult<T> {
        let (value, notifications) = self.observe(operation, result)?.into_parts();
        // Dropping the handle detaches publication from the caller.
        let _ = self.dispatcher.dispatch(notifications);
        Ok(value)
    }

    fn observe<T>(&self, operation: &str, result: IdentityResult<T>) -> IdentityResult<T> {
        if let Err(e) = &result {
            if e.is_infrastructure() && !e.is_cancellation() {
                log::error!("{} failed: {}", operation, e);
            } else {
                log::debug!("{} rejected: {}", operation, e);
            }
        }
        result
    }

    pub async fn health_check(&self, ctx: &CallContext) -> IdentityResult<()> {
        let result = self.controller.health_check(ctx).await;
        self.observe("health_check", result)
    }

    pub async fn register_user(
        &self,
        ctx: &CallContext,
        request: &RegisterRequest,
    ) -> IdentityResult<UserView> {
        let result = self.controller.register_user(ctx, request).await;
        self.commit("register_user", result)
    }

    pub async fn attach_email(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        proof: &ContactProof,
    ) -> IdentityResult<Email> {
        let result = self.controller.attach_email(ctx, user_id, proof).await;
        self.commit("attach_email", result)
    }

    pub async fn attach_phone(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        proof: &ContactProof,
    ) -> IdentityResult<Phone> {
        let result = self.controller.attach_phone(ctx, user_id, proof).await;
        self.commit("attach_phone", result)
    }

    pub async fn add_password(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        password: &str,
    ) -> IdentityResult<Password> {
        let result = self.controller.add_password(ctx, user_id, password).await;
        self.commit("add_password", result)
    }

    pub async fn delete_user(&self, ctx: &CallContext, user_id: UserId) -> IdentityResult<()> {
        let result = self.controller.delete_user(ctx, user_id).await;
        self.commit("delete_user", result)
    }

    pub async fn create_role(&self, ctx: &CallContext, title: &str) -> IdentityResult<Role> {
        let result = self.controller.create_role(ctx, title).await;
        self.commit("create_role", result)
    }

    pub async fn bootstrap_admin_role(&self, ctx: &CallContext) -> IdentityResult<Role> {
        let result = self.controller.bootstrap_admin_role(ctx).await;
        self.commit("bootstrap_admin_role", result)
    }

    pub async fn rename_role(
        &self,
        ctx: &CallContext,
        role_id: RoleId,
        title: &str,
    ) -> IdentityResult<Role> {
        let result = self.controller.rename_role(ctx, role_id, title).await;
        self.commit("rename_role", result)
    }

    pub async fn assign_role(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<UserRole> {
        let result = self.controller.assign_role(ctx, user_id, role_id).await;
        self.commit("assign_role", result)
    }

    pub async fn revoke_role(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> IdentityResult<()> {
        let result = self.controller.revoke_role(ctx, user_id, role_id).await;
        self.commit("revoke_role", result)
    }

    pub async fn request_code(
        &self,
        ctx: &CallContext,
        request: &CodeRequest,
    ) -> IdentityResult<Subject> {
        let result = self.controller.request_code(ctx, request).await;
        self.commit("request_code", result)
    }

    pub async fn authenticate(
        &self,
        ctx: &CallContext,
        authorization: &str,
    ) -> IdentityResult<Identity> {
        let result = self.controller.authenticate(ctx, authorization).await;
        self.commit("authenticate", result)
    }

    pub async fn login(
        &self,
        ctx: &CallContext,
        authorization: &str,
        fingerprint: &str,
        user_agent: &str,
    ) -> IdentityResult<Session> {
        let result = self
            .controller
            .login(ctx, authorization, fingerprint, user_agent)
            .await;
        self.commit("login", result)
    }

    pub async fn renew_session(
        &self,
        ctx: &CallContext,
        request: &RenewRequest,
    ) -> IdentityResult<Session> {
        let result = self.controller.renew_session(ctx, request).await;
        self.commit("renew_session", result)
    }

    pub async fn get_user_view(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> IdentityResult<UserView> {
        let result = self.controller.get_user_view(ctx, user_id).await;
        self.commit("get_user_view", result)
    }

    pub async fn get_user_views(
        &self,
        ctx: &CallContext,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)> {
        let result = self.controller.get_user_views(ctx, filter, pagination).await;
        self.observe("get_user_views", result)
    }
}
