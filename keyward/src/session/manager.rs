//! Session manager implementation.

use super::models::{RenewRequest, Session};
use crate::context::CallContext;
use crate::db::{IdentityStore, SessionRecord, UserId};
use crate::errors::{IdentityError, IdentityResult};
use crate::projection::{ProjectionEngine, Repaired};
use crate::secrets::SecretStore;
use crate::token::TokenCodec;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// Session manager
pub struct SessionManager {
    store: Arc<dyn IdentityStore>,
    secrets: Arc<SecretStore>,
    projection: Arc<ProjectionEngine>,
    codec: TokenCodec,
    access_token_lifetime: chrono::Duration,
    refresh_token_lifetime: chrono::Duration,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    ///
    /// * `store` - Durable identity store
    /// * `secrets` - Secret store providing the signing secret
    /// * `projection` - Source of the roles embedded in access tokens
    /// * `codec` - Token codec
    /// * `access_token_lifetime` - Lifetime of minted access tokens
    /// * `refresh_token_lifetime` - Lifetime of the session row
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Encoding` if the access lifetime does not fit a timestamp
    pub fn new(
        store: Arc<dyn IdentityStore>,
        secrets: Arc<SecretStore>,
        projection: Arc<ProjectionEngine>,
        codec: TokenCodec,
        access_token_lifetime: Duration,
        refresh_token_lifetime: chrono::Duration,
    ) -> IdentityResult<Self> {
        let access_token_lifetime = chrono::Duration::from_std(access_token_lifetime)
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;

        Ok(Self {
            store,
            secrets,
            projection,
            codec,
            access_token_lifetime,
            refresh_token_lifetime,
        })
    }

    /// Mint a session bound to the actual secret, rotating one in if needed
    ///
    /// # Errors
    ///
    /// * `IdentityError::UserNotFound` - The user has no view
    pub async fn create_session(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        fingerprint: &str,
        user_agent: &str,
    ) -> IdentityResult<Repaired<Session>> {
        let minted = self.mint(ctx, user_id, fingerprint, user_agent).await?;
        ctx.run(self.store.create_session(&minted.value.record))
            .await?;
        Ok(minted)
    }

    /// Build a session without persisting it
    async fn mint(
        &self,
        ctx: &CallContext,
        user_id: UserId,
        fingerprint: &str,
        user_agent: &str,
    ) -> IdentityResult<Repaired<Session>> {
        let (view, repaired) = self
            .projection
            .get_user_view(ctx, user_id)
            .await?
            .into_parts();
        let view = view.ok_or(IdentityError::UserNotFound)?;
        let secret = self.secrets.actual_or_rotate(ctx).await?;

        let now = Utc::now();
        let access_expires_at = now + self.access_token_lifetime;
        let access_token = self
            .codec
            .encode(user_id, &view.roles, &secret, access_expires_at)?;

        let record = SessionRecord {
            id: Uuid::new_v4(),
            refresh_token: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.to_string(),
            user_id,
            secret_id: secret.id,
            user_agent: user_agent.to_string(),
            created_at: now,
            expires_at: now + self.refresh_token_lifetime,
        };
        Ok(Repaired {
            value: Session {
                record,
                access_token,
                access_expires_at,
            },
            repaired,
        })
    }

    /// Exchange a live refresh token for a fresh session.
    ///
    /// The replacement is minted first and swapped in atomically, so each
    /// refresh token renews once and a failed renewal leaves it usable.
    ///
    /// # Errors
    ///
    /// * `IdentityError::SessionNotFound` - No unexpired session matches
    ///   user id, refresh token and fingerprint
    pub async fn renew_session(
        &self,
        ctx: &CallContext,
        request: &RenewRequest,
    ) -> IdentityResult<Repaired<Session>> {
        let found = ctx
            .run(self.store.find_session(
                request.user_id,
                &request.refresh_token,
                &request.fingerprint,
                Utc::now(),
            ))
            .await?
            .ok_or(IdentityError::SessionNotFound)?;

        let minted = self
            .mint(ctx, found.user_id, &request.fingerprint, &request.user_agent)
            .await?;
        ctx.run(self.store.rotate_session(found.id, &minted.value.record))
            .await?;
        Ok(minted)
    }
}
