// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The reverse index: tag name → set of entity tokens.
//!
//! Each tag is one store set holding encoded [`EntityRef`](crate::EntityRef)
//! tokens; a tag has no existence beyond that set, so an empty set and a
//! never-created tag look the same. A side registry (another set, of tag
//! names) makes tags discoverable without scanning the keyspace - every
//! registration writes the registry in the same pipeline, and only
//! [`delete_tag`](TagIndexStore::delete_tag) prunes it, so a tag with prior
//! history stays discoverable even when its member set is currently empty.
//!
//! All mutations are idempotent set operations. That is the entire
//! concurrency story: concurrent writers converge on the union of their adds,
//! and unsynchronized readers never see a torn state worse than the documented
//! staleness window.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::storage::traits::{KeyValueStore, StoreError};

/// Named reverse index over an external store.
pub struct TagIndexStore {
    store: Arc<dyn KeyValueStore>,
    /// Prepended to tag names to form the tag-set key (default `"tag:"`).
    tag_key_prefix: String,
    /// Key of the side registry of tag names (default `"tags"`).
    registry_key: String,
}

impl TagIndexStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        tag_key_prefix: impl Into<String>,
        registry_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tag_key_prefix: tag_key_prefix.into(),
            registry_key: registry_key.into(),
        }
    }

    /// Store key holding the given tag's token set.
    #[must_use]
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.tag_key_prefix, tag)
    }

    /// Add one token to one tag set, registering the tag name as a side
    /// effect. Idempotent: the store's set semantics absorb duplicates.
    pub async fn add_member(&self, tag: &str, token: &str) -> Result<(), StoreError> {
        self.add_members(&[tag], token).await
    }

    /// Add one token to several tag sets in a single pipelined round trip.
    ///
    /// Not atomic across tags - each individual add is atomic, and a failure
    /// partway leaves the entity registered under a prefix of `tags`.
    pub async fn add_members(&self, tags: &[&str], token: &str) -> Result<(), StoreError> {
        if tags.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(tags.len() * 2);
        for tag in tags {
            entries.push((self.tag_key(tag), token.to_string()));
            entries.push((self.registry_key.clone(), (*tag).to_string()));
        }
        self.store.set_add_entries(&entries).await?;

        debug!(token, tags = tags.len(), "registered token under tags");
        crate::metrics::record_tag_registrations(tags.len());
        Ok(())
    }

    /// Remove one token from one tag set. Idempotent; returns whether the
    /// token was present. The registry entry is deliberately left behind.
    pub async fn remove_member(&self, tag: &str, token: &str) -> Result<bool, StoreError> {
        self.store.set_remove(&self.tag_key(tag), token).await
    }

    /// Remove the given tokens from every listed tag set, pipelined.
    /// Removals of absent members are no-ops, so over-removal is safe.
    pub async fn remove_members(
        &self,
        tags: &[&str],
        tokens: &[String],
    ) -> Result<(), StoreError> {
        if tags.is_empty() || tokens.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(tags.len() * tokens.len());
        for tag in tags {
            let key = self.tag_key(tag);
            for token in tokens {
                entries.push((key.clone(), token.clone()));
            }
        }
        self.store.set_remove_entries(&entries).await
    }

    /// Union of all tokens across the given tags, deduplicated. An entity
    /// tagged under several of the inputs appears once.
    pub async fn members(&self, tags: &[&str]) -> Result<Vec<String>, StoreError> {
        let mut union = HashSet::new();
        for tag in tags {
            for token in self.store.set_members(&self.tag_key(tag)).await? {
                union.insert(token);
            }
        }
        Ok(union.into_iter().collect())
    }

    /// Every tag name ever registered and not yet pruned via
    /// [`delete_tag`](Self::delete_tag), regardless of current member count.
    pub async fn all_tag_names(&self) -> Result<Vec<String>, StoreError> {
        self.store.set_members(&self.registry_key).await
    }

    /// Drop the tag's entire token set and its registry entry.
    /// Returns whether the token set existed.
    pub async fn delete_tag(&self, tag: &str) -> Result<bool, StoreError> {
        let existed = self.store.key_delete(&self.tag_key(tag)).await?;
        self.store.set_remove(&self.registry_key, tag).await?;
        debug!(tag, existed, "deleted tag set");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryKvStore;

    fn index() -> TagIndexStore {
        TagIndexStore::new(Arc::new(InMemoryKvStore::new()), "tag:", "tags")
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[tokio::test]
    async fn test_add_member_registers_tag_name() {
        let idx = index();
        idx.add_member("hot", "user:1").await.unwrap();

        assert_eq!(idx.members(&["hot"]).await.unwrap(), vec!["user:1"]);
        assert_eq!(idx.all_tag_names().await.unwrap(), vec!["hot"]);
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let idx = index();
        for _ in 0..3 {
            idx.add_member("hot", "user:1").await.unwrap();
        }
        assert_eq!(idx.members(&["hot"]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_members_spans_tags() {
        let idx = index();
        idx.add_members(&["a", "b", "c"], "user:1").await.unwrap();

        assert_eq!(idx.members(&["a"]).await.unwrap(), vec!["user:1"]);
        assert_eq!(idx.members(&["c"]).await.unwrap(), vec!["user:1"]);
        assert_eq!(
            sorted(idx.all_tag_names().await.unwrap()),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_members_union_deduplicates() {
        let idx = index();
        idx.add_member("a", "shared").await.unwrap();
        idx.add_member("b", "shared").await.unwrap();
        idx.add_member("b", "only-b").await.unwrap();

        let union = sorted(idx.members(&["a", "b"]).await.unwrap());
        assert_eq!(union, vec!["only-b", "shared"]);
    }

    #[tokio::test]
    async fn test_remove_member_is_idempotent() {
        let idx = index();
        idx.add_member("hot", "user:1").await.unwrap();

        assert!(idx.remove_member("hot", "user:1").await.unwrap());
        assert!(!idx.remove_member("hot", "user:1").await.unwrap());
        assert!(idx.members(&["hot"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_survives_empty_tag_set() {
        let idx = index();
        idx.add_member("hot", "user:1").await.unwrap();
        idx.remove_member("hot", "user:1").await.unwrap();

        // Set is empty but the name is still discoverable
        assert!(idx.members(&["hot"]).await.unwrap().is_empty());
        assert_eq!(idx.all_tag_names().await.unwrap(), vec!["hot"]);
    }

    #[tokio::test]
    async fn test_delete_tag_prunes_registry() {
        let idx = index();
        idx.add_member("hot", "user:1").await.unwrap();

        assert!(idx.delete_tag("hot").await.unwrap());
        assert!(idx.members(&["hot"]).await.unwrap().is_empty());
        assert!(idx.all_tag_names().await.unwrap().is_empty());

        // Deleting again is a no-op
        assert!(!idx.delete_tag("hot").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_members_across_tags() {
        let idx = index();
        idx.add_members(&["a", "b"], "t1").await.unwrap();
        idx.add_members(&["a", "b"], "t2").await.unwrap();

        idx.remove_members(&["a", "b"], &["t1".to_string()])
            .await
            .unwrap();

        assert_eq!(idx.members(&["a"]).await.unwrap(), vec!["t2"]);
        assert_eq!(idx.members(&["b"]).await.unwrap(), vec!["t2"]);
    }

    #[tokio::test]
    async fn test_unknown_tag_resolves_empty() {
        let idx = index();
        assert!(idx.members(&["never-created"]).await.unwrap().is_empty());
    }
}
