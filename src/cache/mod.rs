// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The tag-aware cache engine.
//!
//! [`TagCache`] ties the pieces together: primary writes go to the store
//! first, index registration follows, and tag-scoped reads fan back out -
//! index first, then (in cleanup mode) per-entity existence probes with
//! stale-token pruning written back to the index.
//!
//! ```text
//!            writes                        tag-scoped reads
//!   caller ──────────► TagCache   caller ──────────► TagCache
//!                        │ 1. primary write            │ 1. union tag sets
//!                        │ 2. token → tag sets         │ 2. decode tokens
//!                        ▼                             │ 3. [cleanup] probe + prune
//!              ┌─────────┴─────────┐                   ▼
//!              │  KeyValueStore    │          entity references
//!              │  (Redis / memory) │
//!              └───────────────────┘
//! ```
//!
//! There is no background sweeper and no in-process locking: every index
//! mutation is an idempotent store-side set operation, and staleness left by
//! TTL expiry or out-of-band deletes is reconciled only when a caller opts
//! into a cleanup-mode read.

mod invalidate;
mod resolve;
mod write;

pub use invalidate::{FailedDelete, InvalidationReport};
pub use resolve::{Cleanup, ResolvedMember};

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::TagCacheConfig;
use crate::entity::InvalidToken;
use crate::index::TagIndexStore;
use crate::storage::redis::RedisKvStore;
use crate::storage::traits::{KeyValueStore, StoreError};

#[derive(Error, Debug)]
pub enum TagCacheError {
    /// The external store could not be reached or rejected a command.
    /// Surfaced unchanged; retry policy lives in the store client.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A token failed to decode during a cleanup-mode read.
    #[error(transparent)]
    InvalidEntityReference(#[from] InvalidToken),

    /// One or more entity deletions failed during tag invalidation. The
    /// already-deleted subset stays deleted and the tag sets were kept, so
    /// retrying the same call is safe.
    #[error(
        "invalidation incomplete: {} of {} references failed; tag sets kept for retry",
        .report.failed.len(),
        .report.attempted()
    )]
    PartialInvalidation { report: InvalidationReport },
}

/// Tag-aware caching client over an external key-value store.
///
/// # Thread Safety
///
/// `TagCache` is `Send + Sync` and designed for unsynchronized concurrent
/// use: it holds no mutable state of its own, and all shared state lives in
/// the store behind idempotent per-command operations.
pub struct TagCache {
    pub(super) store: Arc<dyn KeyValueStore>,
    pub(super) index: TagIndexStore,
}

impl TagCache {
    /// Connect to Redis using `config.redis_url` (and `config.key_prefix`
    /// for namespacing).
    pub async fn connect(config: TagCacheConfig) -> Result<Self, TagCacheError> {
        let url = config.redis_url.as_deref().ok_or_else(|| {
            StoreError::Backend("redis_url is not configured".to_string())
        })?;

        let store = RedisKvStore::with_prefix(url, config.key_prefix.as_deref())
            .await
            .map_err(|e| {
                crate::metrics::record_connection_error("redis");
                e
            })?;

        info!(prefix = %store.prefix(), "connected tag cache to redis");
        Ok(Self::with_store(Arc::new(store), &config))
    }

    /// Build the engine over any [`KeyValueStore`] implementation - the
    /// in-memory store for tests and embedded use, or a custom backend.
    pub fn with_store(store: Arc<dyn KeyValueStore>, config: &TagCacheConfig) -> Self {
        let index = TagIndexStore::new(
            store.clone(),
            config.tag_key_prefix.clone(),
            config.tag_registry_key.clone(),
        );
        Self { store, index }
    }

    /// Every tag name ever registered and not yet deleted, whether or not
    /// its member set is currently empty.
    pub async fn all_tag_names(&self) -> Result<Vec<String>, TagCacheError> {
        Ok(self.index.all_tag_names().await?)
    }

    /// Direct access to the underlying store primitives, for callers that
    /// read or write entities outside the tag machinery.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The reverse index itself, for callers that manage raw tokens.
    #[must_use]
    pub fn index(&self) -> &TagIndexStore {
        &self.index
    }
}
