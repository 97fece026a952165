//! Tiered secret store implementation.

use super::models::{Secret, SecretId};
use crate::cache::{self, DistributedCache, LocalCache};
use crate::context::CallContext;
use crate::db::IdentityStore;
use crate::errors::IdentityResult;
use std::{sync::Arc, time::Duration};

/// Cache key of the actual-secret pointer
pub const ACTUAL_SECRET_KEY: &str = "secret:actual";

/// Cache key of a secret looked up by id
pub fn secret_key(id: SecretId) -> String {
    format!("secret:{id}")
}

/// Cache lifetimes of the secret tiers.
#[derive(Debug, Clone, Copy)]
pub struct SecretTtl {
    /// Process-local tier
    pub local: Duration,
    /// Shared tier, by id; outlives every token that can reference the secret
    pub shared: Duration,
    /// Actual-secret pointer; this is the rotation interval
    pub actual: Duration,
}

/// Read-through / write-through store for signing secrets
pub struct SecretStore {
    local: LocalCache<Secret>,
    shared: Arc<dyn DistributedCache>,
    store: Arc<dyn IdentityStore>,
    ttl: SecretTtl,
}

impl SecretStore {
    /// Create a new secret store
    ///
    /// # Arguments
    ///
    /// * `shared` - Distributed cache shared by all instances
    /// * `store` - Durable identity store
    /// * `ttl` - Tier lifetimes
    pub fn new(
        shared: Arc<dyn DistributedCache>,
        store: Arc<dyn IdentityStore>,
        ttl: SecretTtl,
    ) -> Self {
        Self {
            local: LocalCache::new(),
            shared,
            store,
            ttl,
        }
    }

    /// Process-local tier (exposed for inspection)
    pub fn local(&self) -> &LocalCache<Secret> {
        &self.local
    }

    /// Get a secret by id from the first tier that has it
    ///
    /// # Returns
    ///
    /// * `IdentityResult<Option<Secret>>` - The secret, or `None` when no tier knows it
    pub async fn get_secret(
        &self,
        ctx: &CallContext,
        id: SecretId,
    ) -> IdentityResult<Option<Secret>> {
        let key = secret_key(id);

        if let Some(secret) = self.local.get(&key).await {
            return Ok(Some(secret));
        }

        if let Some(secret) = self.shared_get(ctx, &key).await? {
            self.local.set(&key, secret.clone(), self.ttl.local).await;
            return Ok(Some(secret));
        }

        let Some(secret) = ctx.run(self.store.get_secret(id)).await? else {
            return Ok(None);
        };

        self.shared_set(ctx, &key, &secret, self.ttl.shared).await?;
        self.local.set(&key, secret.clone(), self.ttl.local).await;
        Ok(Some(secret))
    }

    /// Get the secret currently used for signing.
    ///
    /// Only the cache tiers are consulted. `None` means the caller should
    /// rotate with [`SecretStore::create_secret`].
    pub async fn get_actual_secret(&self, ctx: &CallContext) -> IdentityResult<Option<Secret>> {
        if let Some(secret) = self.local.get(ACTUAL_SECRET_KEY).await {
            return Ok(Some(secret));
        }

        let Some(secret) = self.shared_get(ctx, ACTUAL_SECRET_KEY).await? else {
            return Ok(None);
        };

        self.local
            .set(ACTUAL_SECRET_KEY, secret.clone(), self.local_actual_ttl())
            .await;
        Ok(Some(secret))
    }

    /// Rotate: create a new secret and make it the actual one.
    ///
    /// # Errors
    ///
    /// Fails only when the durable write fails. Cache population errors are
    /// logged and leave later lookups to fall through to lower tiers.
    pub async fn create_secret(&self, ctx: &CallContext) -> IdentityResult<Secret> {
        let secret = Secret::generate();
        ctx.run(self.store.insert_secret(&secret)).await?;

        let key = secret_key(secret.id);
        self.shared_set(ctx, &key, &secret, self.ttl.shared).await?;
        self.shared_set(ctx, ACTUAL_SECRET_KEY, &secret, self.ttl.actual)
            .await?;

        self.local.set(&key, secret.clone(), self.ttl.local).await;
        self.local
            .set(ACTUAL_SECRET_KEY, secret.clone(), self.local_actual_ttl())
            .await;

        log::info!("Rotated signing secret {}", secret.id);
        Ok(secret)
    }

    /// Actual secret, rotating one into existence when none is cached
    pub async fn actual_or_rotate(&self, ctx: &CallContext) -> IdentityResult<Secret> {
        match self.get_actual_secret(ctx).await? {
            Some(secret) => Ok(secret),
            None => self.create_secret(ctx).await,
        }
    }

    fn local_actual_ttl(&self) -> Duration {
        self.ttl.local.min(self.ttl.actual)
    }

    /// Shared-tier read; transport and decode failures count as a miss.
    /// Only cancellation and deadline errors propagate.
    async fn shared_get(&self, ctx: &CallContext, key: &str) -> IdentityResult<Option<Secret>> {
        match ctx
            .run(cache::get_json::<Secret>(self.shared.as_ref(), key))
            .await
        {
            Ok(found) => Ok(found),
            Err(e) if e.is_cache() => {
                log::warn!("Shared cache read for {} failed: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn shared_set(
        &self,
        ctx: &CallContext,
        key: &str,
        secret: &Secret,
        ttl: Duration,
    ) -> IdentityResult<()> {
        match ctx
            .run(cache::set_json(self.shared.as_ref(), key, secret, ttl))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_cache() => {
                log::warn!("Shared cache write for {} failed: {}", key, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
