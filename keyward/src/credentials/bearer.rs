//! Bearer access tokens minted by the session manager.

use super::Identity;
use crate::context::CallContext;
use crate::errors::{IdentityError, IdentityResult};
use crate::secrets::SecretStore;
use crate::token::TokenCodec;
use std::sync::Arc;

/// Backend trusting the claims of a correctly signed, unexpired token
pub struct BearerBackend {
    secrets: Arc<SecretStore>,
    codec: TokenCodec,
}

impl BearerBackend {
    pub fn new(secrets: Arc<SecretStore>, codec: TokenCodec) -> Self {
        Self { secrets, codec }
    }

    /// Resolve a bearer token.
    ///
    /// Roles and the admin flag come from the token itself; they hold for the
    /// token's lifetime.
    ///
    /// # Errors
    ///
    /// * `IdentityError::IncorrectToken` - Malformed or badly signed token
    /// * `IdentityError::SecretNotFound` - The signing secret is unknown
    /// * `IdentityError::InvalidToken` - Expired or not yet valid
    pub async fn resolve_user(&self, ctx: &CallContext, token: &str) -> IdentityResult<Identity> {
        let untrusted = self.codec.decode_unverified(token)?;
        let secret = self
            .secrets
            .get_secret(ctx, untrusted.sid)
            .await?
            .ok_or(IdentityError::SecretNotFound)?;

        let claims = self.codec.decode_verified(token, &secret)?;
        Ok(Identity {
            user_id: claims.sub,
            admin: claims.admin,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::{IdentityStore, MemoryIdentityStore};
    use crate::secrets::{Secret, SecretTtl};
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    fn fixture() -> (BearerBackend, Arc<SecretStore>, Arc<MemoryIdentityStore>) {
        let store = Arc::new(MemoryIdentityStore::new());
        let secrets = Arc::new(SecretStore::new(
            Arc::new(MemoryCache::new()),
            store.clone(),
            SecretTtl {
                local: StdDuration::from_secs(60),
                shared: StdDuration::from_secs(3600),
                actual: StdDuration::from_secs(600),
            },
        ));
        let backend = BearerBackend::new(secrets.clone(), TokenCodec::new("admin"));
        (backend, secrets, store)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_claims() {
        let (backend, secrets, _) = fixture();
        let ctx = CallContext::new();
        let secret = secrets.create_secret(&ctx).await.unwrap();
        let user_id = Uuid::new_v4();
        let token = TokenCodec::new("admin")
            .encode(
                user_id,
                &["admin".to_string()],
                &secret,
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();

        let identity = backend.resolve_user(&ctx, &token).await.unwrap();
        assert_eq!(identity.user_id, user_id);
        assert!(identity.admin);
        assert_eq!(identity.roles, vec!["admin"]);
    }

    #[tokio::test]
    async fn test_unknown_secret() {
        let (backend, _, _) = fixture();
        let token = TokenCodec::new("admin")
            .encode(
                Uuid::new_v4(),
                &[],
                &Secret::generate(),
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();

        let err = backend
            .resolve_user(&CallContext::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::SecretNotFound));
    }

    #[tokio::test]
    async fn test_secret_known_only_to_durable_store() {
        let (backend, _, store) = fixture();
        let secret = Secret::generate();
        store.insert_secret(&secret).await.unwrap();
        let token = TokenCodec::new("admin")
            .encode(Uuid::new_v4(), &[], &secret, Utc::now() + Duration::minutes(5))
            .unwrap();

        backend
            .resolve_user(&CallContext::new(), &token)
            .await
            .unwrap();
        assert_eq!(store.stats().secret_reads, 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let (backend, secrets, _) = fixture();
        let ctx = CallContext::new();
        let secret = secrets.create_secret(&ctx).await.unwrap();
        let token = TokenCodec::new("admin")
            .encode(Uuid::new_v4(), &[], &secret, Utc::now() - Duration::minutes(5))
            .unwrap();

        let err = backend.resolve_user(&ctx, &token).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken));
    }

    #[tokio::test]
    async fn test_garbage_never_reaches_key_lookup() {
        let (backend, _, store) = fixture();
        let err = backend
            .resolve_user(&CallContext::new(), "not-a-token")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::IncorrectToken));
        assert_eq!(store.stats().secret_reads, 0);
    }
}
