use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The primitive operations the tag engine consumes from the underlying
/// key-value store.
///
/// One implementation talks to a real backend
/// ([`RedisKvStore`](super::redis::RedisKvStore)); the in-memory
/// implementation backs tests and embedded use. Every method maps to a single
/// store command and is atomic at the store level - that per-command
/// atomicity, together with idempotent set semantics, is the only concurrency
/// control the tag engine relies on.
///
/// Values are opaque strings: serialization belongs to the caller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    // --- keys ---

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn key_delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Set a TTL on an existing key. Returns false if the key does not exist.
    async fn key_expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining TTL, `None` when the key is missing or has no expiry.
    async fn key_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    // --- strings ---

    async fn string_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn string_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    // --- hashes ---

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a hash field. Returns whether it existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    // --- sets ---

    /// Add a member. Returns false when it was already present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member. Returns false when it was absent.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    // --- sorted sets ---

    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StoreError>;

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Score of a member; presence of a score doubles as an existence probe
    /// for sorted-set and geo members.
    async fn sorted_set_score(&self, key: &str, member: &str)
        -> Result<Option<f64>, StoreError>;

    // --- batched writes ---

    /// Add each `(set key, member)` entry in one round trip where the backend
    /// supports it. Each individual add stays atomic; the batch as a whole is
    /// not. Default implementation falls back to sequential adds.
    async fn set_add_entries(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        for (key, member) in entries {
            self.set_add(key, member).await?;
        }
        Ok(())
    }

    /// Remove each `(set key, member)` entry, pipelined where supported.
    /// Default implementation falls back to sequential removes.
    async fn set_remove_entries(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        for (key, member) in entries {
            self.set_remove(key, member).await?;
        }
        Ok(())
    }
}
