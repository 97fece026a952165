//! Basic credentials: `base64("identifier:secondFactor")`.
//!
//! The identifier is an email or a phone number. The second factor is a
//! password, or a pending confirmation code when it has exactly
//! [`CODE_LENGTH`] characters. A code-length value is tried as a code first
//! and then as a password, so short passwords keep working.

use super::Identity;
use crate::context::CallContext;
use crate::contact::{CODE_LENGTH, ConfirmationCodes, Subject, normalize_email, normalize_phone};
use crate::db::{IdentityStore, UserId};
use crate::errors::{IdentityError, IdentityResult};
use crate::password::PasswordHasher;
use crate::projection::{ProjectionEngine, Repaired};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;

/// Normalized contact named by the identifier half
enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    fn parse(identifier: &str) -> IdentityResult<Self> {
        match normalize_email(identifier) {
            Ok(email) => Ok(Contact::Email(email)),
            Err(_) => Ok(Contact::Phone(normalize_phone(identifier)?.e164)),
        }
    }

    fn subject(&self) -> Subject {
        match self {
            Contact::Email(email) => Subject::Email(email.clone()),
            Contact::Phone(phone) => Subject::Phone(phone.clone()),
        }
    }

    async fn owner(&self, ctx: &CallContext, store: &dyn IdentityStore) -> IdentityResult<UserId> {
        match self {
            Contact::Email(email) => ctx
                .run(store.get_email(email))
                .await?
                .map(|record| record.user_id)
                .ok_or(IdentityError::EmailNotFound),
            Contact::Phone(phone) => ctx
                .run(store.get_phone(phone))
                .await?
                .map(|record| record.user_id)
                .ok_or(IdentityError::PhoneNotFound),
        }
    }
}

/// Decode and split the presented credential on its first colon
pub fn decode_credentials(presented: &str) -> IdentityResult<(String, String)> {
    let raw = STANDARD
        .decode(presented.trim())
        .map_err(|_| IdentityError::IncorrectToken)?;
    let decoded = String::from_utf8(raw).map_err(|_| IdentityError::IncorrectToken)?;

    match decoded.split_once(':') {
        Some((identifier, second)) if !identifier.is_empty() && !second.is_empty() => {
            Ok((identifier.to_string(), second.to_string()))
        }
        _ => Err(IdentityError::IncorrectToken),
    }
}

/// Encode an identifier and second factor as a Basic credential
pub fn encode_credentials(identifier: &str, second: &str) -> String {
    STANDARD.encode(format!("{identifier}:{second}"))
}

/// Email/phone + password or confirmation code backend
pub struct BasicBackend {
    store: Arc<dyn IdentityStore>,
    codes: ConfirmationCodes,
    hasher: PasswordHasher,
    projection: Arc<ProjectionEngine>,
    admin_role: String,
}

impl BasicBackend {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        codes: ConfirmationCodes,
        hasher: PasswordHasher,
        projection: Arc<ProjectionEngine>,
        admin_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            codes,
            hasher,
            projection,
            admin_role: admin_role.into(),
        }
    }

    /// Resolve a Basic credential to an identity
    ///
    /// # Errors
    ///
    /// * `IdentityError::IncorrectToken` - Not base64, not UTF-8 or not `identifier:secret`
    /// * `IdentityError::IncorrectPhone` - Identifier is neither email nor phone
    /// * Contact, password or code errors of the password path when both paths fail
    /// * `IdentityError::UserNotFound` - The resolved user has no view
    pub async fn resolve_user(
        &self,
        ctx: &CallContext,
        presented: &str,
    ) -> IdentityResult<Repaired<Identity>> {
        let (identifier, second) = decode_credentials(presented)?;
        let contact = Contact::parse(&identifier)?;

        if second.chars().count() == CODE_LENGTH {
            match self.resolve_by_code(ctx, &contact, &second).await {
                Ok(user_id) => return self.identity(ctx, user_id).await,
                Err(e) if e.is_cancellation() => return Err(e),
                Err(_) => {}
            }
        }

        let user_id = self.resolve_by_password(ctx, &contact, &second).await?;
        self.identity(ctx, user_id).await
    }

    async fn resolve_by_code(
        &self,
        ctx: &CallContext,
        contact: &Contact,
        code: &str,
    ) -> IdentityResult<UserId> {
        self.codes.verify(ctx, &contact.subject(), code).await?;
        contact.owner(ctx, self.store.as_ref()).await
    }

    async fn resolve_by_password(
        &self,
        ctx: &CallContext,
        contact: &Contact,
        password: &str,
    ) -> IdentityResult<UserId> {
        let user_id = contact.owner(ctx, self.store.as_ref()).await?;
        let stored = ctx
            .run(self.store.latest_password(user_id))
            .await?
            .ok_or(IdentityError::PasswordNotFound)?;

        self.hasher.verify(password, &stored.hash).await?;
        Ok(user_id)
    }

    async fn identity(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> IdentityResult<Repaired<Identity>> {
        let (view, repaired) = self
            .projection
            .get_user_view(ctx, user_id)
            .await?
            .into_parts();
        let view = view.ok_or(IdentityError::UserNotFound)?;

        Ok(Repaired {
            value: Identity {
                user_id,
                admin: view.has_role(&self.admin_role),
                roles: view.roles,
            },
            repaired,
        })
    }
}
