//! User view projection.
//!
//! Views are recomputed in the durable store by a single conditional upsert
//! and then written to the distributed cache under `user_view:{id}`. Reads are
//! cache-first and repair a missing entry on the spot; a repair that changed
//! the stored row is reported back so the caller can announce it.

use crate::cache::{self, DistributedCache};
use crate::context::CallContext;
use crate::db::{
    IdentityStore, Pagination, PaginationInfo, Recomputed, RoleId, UserId, UserView,
    UserViewFilter,
};
use crate::errors::IdentityResult;
use std::{sync::Arc, time::Duration};

/// Cache key of a user's view
pub fn user_view_key(user_id: UserId) -> String {
    format!("user_view:{user_id}")
}

/// A read result plus the users whose stored view the read had to rewrite
#[derive(Debug, Clone, PartialEq)]
#[must_use = "repaired views must be announced"]
pub struct Repaired<T> {
    pub value: T,
    pub repaired: Vec<UserId>,
}

impl<T> Repaired<T> {
    /// A result whose read changed nothing
    pub fn clean(value: T) -> Self {
        Self {
            value,
            repaired: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Repaired<U> {
        Repaired {
            value: f(self.value),
            repaired: self.repaired,
        }
    }

    /// Carry the repairs of an earlier read along
    pub fn with_repaired(mut self, earlier: Vec<UserId>) -> Self {
        for user_id in earlier {
            if !self.repaired.contains(&user_id) {
                self.repaired.push(user_id);
            }
        }
        self
    }

    pub fn into_parts(self) -> (T, Vec<UserId>) {
        (self.value, self.repaired)
    }
}

/// Maintains and serves user views
pub struct ProjectionEngine {
    store: Arc<dyn IdentityStore>,
    cache: Arc<dyn DistributedCache>,
    ttl: Duration,
}

impl ProjectionEngine {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: Arc<dyn DistributedCache>,
        ttl: Duration,
    ) -> Self {
        Self { store, cache, ttl }
    }

    /// Recompute the views of the given users and refresh their cache entries
    pub async fn recompute_for_users(
        &self,
        ctx: &CallContext,
        user_ids: &[UserId],
    ) -> IdentityResult<Recomputed> {
        if user_ids.is_empty() {
            return Ok(Recomputed::default());
        }

        let recomputed = ctx.run(self.store.recompute_user_views(user_ids)).await?;
        self.cache_views(ctx, &recomputed.views).await?;
        Ok(recomputed)
    }

    /// Recompute the views of every user currently assigned one of the roles
    pub async fn recompute_for_roles(
        &self,
        ctx: &CallContext,
        role_ids: &[RoleId],
    ) -> IdentityResult<Recomputed> {
        if role_ids.is_empty() {
            return Ok(Recomputed::default());
        }

        let recomputed = ctx.run(self.store.recompute_role_views(role_ids)).await?;
        self.cache_views(ctx, &recomputed.views).await?;
        Ok(recomputed)
    }

    /// Cache-first view lookup; a miss recomputes and caches the view
    ///
    /// # Returns
    ///
    /// * `IdentityResult<Repaired<Option<UserView>>>` - `None` when the user
    ///   does not exist; `repaired` names the user when the recompute had to
    ///   rewrite a stale stored row
    pub async fn get_user_view(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> IdentityResult<Repaired<Option<UserView>>> {
        let key = user_view_key(user_id);
        match ctx
            .run(cache::get_json::<UserView>(self.cache.as_ref(), &key))
            .await
        {
            Ok(Some(view)) => return Ok(Repaired::clean(Some(view))),
            Ok(None) => {}
            Err(e) if e.is_cache() => {
                log::warn!("User view cache read for {} failed: {}", user_id, e);
            }
            Err(e) => return Err(e),
        }

        let recomputed = self.recompute_for_users(ctx, &[user_id]).await?;
        Ok(Repaired {
            value: recomputed.views.into_iter().next(),
            repaired: recomputed.written,
        })
    }

    /// Filtered, paginated views straight from the durable store
    pub async fn get_user_views(
        &self,
        ctx: &CallContext,
        filter: &UserViewFilter,
        pagination: Pagination,
    ) -> IdentityResult<(Vec<UserView>, PaginationInfo)> {
        ctx.run(self.store.get_user_views(filter, pagination)).await
    }

    /// Drop cached views of deleted users
    pub async fn forget(&self, ctx: &CallContext, user_ids: &[UserId]) -> IdentityResult<()> {
        for user_id in user_ids {
            match ctx
                .run(self.cache.delete(&user_view_key(*user_id)))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_cache() => {
                    log::warn!("User view cache delete for {} failed: {}", user_id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn cache_views(&self, ctx: &CallContext, views: &[UserView]) -> IdentityResult<()> {
        for view in views {
            let key = user_view_key(view.user_id);
            match ctx
                .run(cache::set_json(self.cache.as_ref(), &key, view, self.ttl))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_cache() => {
                    log::warn!("User view cache write for {} failed: {}", view.user_id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::{MemoryIdentityStore, NewUser};

    fn setup() -> (ProjectionEngine, Arc<MemoryCache>, Arc<MemoryIdentityStore>) {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(MemoryIdentityStore::new());
        let engine = ProjectionEngine::new(store.clone(), cache.clone(), Duration::from_secs(60));
        (engine, cache, store)
    }

    async fn user_with_email(store: &MemoryIdentityStore, email: &str) -> UserId {
        let registered = store
            .create_user(&NewUser {
                email: Some(email.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        registered.user.id
    }

    #[tokio::test]
    async fn test_recompute_twice_is_idempotent() {
        let (engine, cache, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;

        let first = engine.recompute_for_users(&ctx, &[user_id]).await.unwrap();
        assert_eq!(first.written, vec![user_id]);
        let cached_first = cache.get(&user_view_key(user_id)).await.unwrap().unwrap();
        let writes_after_first = store.stats().view_writes;

        let second = engine.recompute_for_users(&ctx, &[user_id]).await.unwrap();
        let cached_second = cache.get(&user_view_key(user_id)).await.unwrap().unwrap();

        assert!(second.written.is_empty());
        assert_eq!(store.stats().view_writes, writes_after_first);
        assert_eq!(cached_first, cached_second);
        assert_eq!(first.views, second.views);
    }

    #[tokio::test]
    async fn test_cache_miss_self_heals() {
        let (engine, cache, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;

        assert!(cache.get(&user_view_key(user_id)).await.unwrap().is_none());
        let read = engine.get_user_view(&ctx, user_id).await.unwrap();
        assert_eq!(read.repaired, vec![user_id]);
        assert_eq!(read.value.unwrap().emails, vec!["a@b.com"]);
        assert!(cache.get(&user_view_key(user_id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refilling_cache_for_current_row_repairs_nothing() {
        let (engine, cache, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;
        engine.recompute_for_users(&ctx, &[user_id]).await.unwrap();

        cache.delete(&user_view_key(user_id)).await.unwrap();
        let read = engine.get_user_view(&ctx, user_id).await.unwrap();
        assert!(read.repaired.is_empty());
        assert!(read.value.is_some());
    }

    #[test]
    fn test_with_repaired_merges_without_duplicates() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let read = Repaired {
            value: (),
            repaired: vec![a],
        }
        .with_repaired(vec![a, b]);
        assert_eq!(read.repaired, vec![a, b]);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let (engine, _, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;
        engine.recompute_for_users(&ctx, &[user_id]).await.unwrap();

        // facts changed behind the projection's back; the cached view still wins
        store.upsert_email(user_id, "c@d.com").await.unwrap();
        let read = engine.get_user_view(&ctx, user_id).await.unwrap();
        assert!(read.repaired.is_empty());
        assert_eq!(read.value.unwrap().emails, vec!["a@b.com"]);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_view() {
        let (engine, cache, _) = setup();
        let view = engine
            .get_user_view(&CallContext::new(), uuid::Uuid::new_v4())
            .await
            .unwrap();
        assert!(view.value.is_none());
        assert!(view.repaired.is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_forget_drops_cache_entries() {
        let (engine, cache, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;
        engine.recompute_for_users(&ctx, &[user_id]).await.unwrap();

        engine.forget(&ctx, &[user_id]).await.unwrap();
        assert!(cache.get(&user_view_key(user_id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_recompute_writes_nothing() {
        let (engine, cache, store) = setup();
        let ctx = CallContext::new();
        let user_id = user_with_email(&store, "a@b.com").await;
        ctx.cancel();

        assert!(engine.recompute_for_users(&ctx, &[user_id]).await.is_err());
        assert_eq!(store.stats().view_writes, 0);
        assert!(cache.is_empty().await);
    }
}
