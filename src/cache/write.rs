//! Write path: primary mutation plus index registration.

use std::time::Duration;

use tracing::debug;

use crate::entity::{EntityRef, EntityWrite};
use crate::metrics::{self, LatencyTimer};

use super::{TagCache, TagCacheError};

impl TagCache {
    /// Write an entity and register it under each of `tags`.
    ///
    /// The primary write is issued before any index write: an observer who
    /// finds the token under a tag can assume the entity write was at least
    /// attempted, and a failure between the two steps leaves an unindexed
    /// entity (reachable by direct lookup) rather than an indexed phantom.
    /// No cross-step atomicity beyond that ordering; concurrent taggers of
    /// the same entity converge on the union of their tag sets.
    ///
    /// `ttl` applies to the written string key, or - for member kinds - to
    /// the whole container via `key_expire`, since the store has no
    /// per-member expiry.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tag_cache::{TagCache, EntityWrite};
    /// # async fn example(cache: &TagCache) -> Result<(), tag_cache::TagCacheError> {
    /// cache
    ///     .set_with_tags(
    ///         EntityWrite::String { key: "user:42", value: "ada" },
    ///         &["users", "region:eu"],
    ///         None,
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_with_tags(
        &self,
        write: EntityWrite<'_>,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<(), TagCacheError> {
        let _timer = LatencyTimer::new("set_with_tags");

        match write {
            EntityWrite::String { key, value } => {
                self.store.string_set(key, value, ttl).await?;
            }
            EntityWrite::HashField { key, field, value } => {
                self.store.hash_set(key, field, value).await?;
                if let Some(ttl) = ttl {
                    self.store.key_expire(key, ttl).await?;
                }
            }
            EntityWrite::SetMember { key, member } => {
                self.store.set_add(key, member).await?;
                if let Some(ttl) = ttl {
                    self.store.key_expire(key, ttl).await?;
                }
            }
            EntityWrite::SortedSetMember { key, member, score } => {
                self.store.sorted_set_add(key, member, score).await?;
                if let Some(ttl) = ttl {
                    self.store.key_expire(key, ttl).await?;
                }
            }
        }

        let entity = write.entity_ref();
        self.index.add_members(tags, &entity.encode()).await?;

        debug!(%entity, tags = tags.len(), "wrote entity with tags");
        metrics::record_operation("set_with_tags", "success");
        Ok(())
    }

    /// Register an existing entity under additional tags. Index-only: the
    /// primary store is not touched, and nothing checks that the entity
    /// actually exists - a later cleanup-mode read will prune it if not.
    pub async fn add_tags_to_entity(
        &self,
        entity: &EntityRef,
        tags: &[&str],
    ) -> Result<(), TagCacheError> {
        self.index.add_members(tags, &entity.encode()).await?;
        metrics::record_operation("add_tags", "success");
        Ok(())
    }

    /// Remove an entity's membership from each of `tags`. Index-only and
    /// idempotent; tags that never held the entity are no-ops.
    pub async fn remove_tags_from_entity(
        &self,
        entity: &EntityRef,
        tags: &[&str],
    ) -> Result<(), TagCacheError> {
        let token = entity.encode();
        self.index
            .remove_members(tags, std::slice::from_ref(&token))
            .await?;
        metrics::record_operation("remove_tags", "success");
        Ok(())
    }

    /// Move one entity's membership from `old_tag` to `new_tag`.
    ///
    /// Add-then-remove, so the membership is never lost to a concurrent
    /// reader mid-rename (it may briefly appear under both tags). Scoped to
    /// one entity: renaming an entire tag wholesale is unsupported - it
    /// would mean enumerating and rewriting every member, breaking the
    /// constant-cost-per-entity model.
    pub async fn rename_tag(
        &self,
        entity: &EntityRef,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<(), TagCacheError> {
        let token = entity.encode();
        self.index.add_member(new_tag, &token).await?;
        self.index.remove_member(old_tag, &token).await?;
        metrics::record_operation("rename_tag", "success");
        Ok(())
    }
}
