//! Redis backend for the tag engine.
//!
//! Thin, retry-wrapped mapping from [`KeyValueStore`] primitives onto single
//! Redis commands. Tag registration and pruning go through the pipelined
//! entry batches (`SADD`/`SREM` fan-out in one round trip); everything else
//! is one command per call.
//!
//! An optional key prefix namespaces every key - primary entities and tag
//! sets alike - when the Redis instance is shared with other applications.
//! Entity tokens always carry *unprefixed* container keys: the prefix is
//! applied here, uniformly, on the way out.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, pipe};
use std::time::Duration;

use super::traits::{KeyValueStore, StoreError};
use crate::resilience::retry::{retry, RetryConfig};

fn map_redis_err(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

/// Seconds for EXPIRE/SETEX; Redis treats 0 as "delete now", so clamp up.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

pub struct RedisKvStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:user.alice")
    prefix: String,
}

impl RedisKvStore {
    /// Connect without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix.
    ///
    /// The prefix is prepended to every key this store touches, enabling
    /// namespacing when sharing a Redis instance with other applications.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tag_cache::storage::redis::RedisKvStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys become "myapp:user:42", "myapp:tag:active", ...
    /// let store = RedisKvStore::with_prefix("redis://localhost", Some("myapp:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, StoreError> {
        let client = Client::open(connection_string).map_err(map_redis_err)?;

        // Use startup config: fast-fail after a few seconds, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(map_redis_err)?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl KeyValueStore for RedisKvStore {
    async fn key_exists(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_exists", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let exists: bool = conn.exists(&key).await?;
                Ok(exists)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn key_delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_del", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let removed: i64 = conn.del(&key).await?;
                Ok(removed > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn key_expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let secs = ttl_secs(ttl) as i64;

        retry("redis_expire", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let set: bool = conn.expire(&key, secs).await?;
                Ok(set)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn key_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_ttl", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                // -2 = no key, -1 = no expiry
                let secs: i64 = conn.ttl(&key).await?;
                Ok(if secs >= 0 {
                    Some(Duration::from_secs(secs as u64))
                } else {
                    None
                })
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn string_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let value: Option<String> = conn.get(&key).await?;
                Ok(value)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn string_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let value = value.to_string();

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let value = value.clone();
            async move {
                match ttl {
                    Some(ttl) => {
                        let _: () = conn.set_ex(&key, &value, ttl_secs(ttl)).await?;
                    }
                    None => {
                        let _: () = conn.set(&key, &value).await?;
                    }
                }
                Ok(())
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let field = field.to_string();

        retry("redis_hget", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let field = field.clone();
            async move {
                let value: Option<String> = conn.hget(&key, &field).await?;
                Ok(value)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let field = field.to_string();
        let value = value.to_string();

        retry("redis_hset", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let field = field.clone();
            let value = value.clone();
            async move {
                let _: i64 = conn.hset(&key, &field, &value).await?;
                Ok(())
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let field = field.to_string();

        retry("redis_hdel", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let field = field.clone();
            async move {
                let removed: i64 = conn.hdel(&key, &field).await?;
                Ok(removed > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let field = field.to_string();

        retry("redis_hexists", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let field = field.clone();
            async move {
                let exists: bool = conn.hexists(&key, &field).await?;
                Ok(exists)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_sadd", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let added: i64 = conn.sadd(&key, &member).await?;
                Ok(added > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_srem", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let removed: i64 = conn.srem(&key, &member).await?;
                Ok(removed > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);

        retry("redis_smembers", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let members: Vec<String> = conn.smembers(&key).await?;
                Ok(members)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_sismember", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let is_member: bool = conn.sismember(&key, &member).await?;
                Ok(is_member)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_zadd", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let added: i64 = conn.zadd(&key, &member, score).await?;
                Ok(added > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_zrem", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let removed: i64 = conn.zrem(&key, &member).await?;
                Ok(removed > 0)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    async fn sorted_set_score(
        &self,
        key: &str,
        member: &str,
    ) -> Result<Option<f64>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let member = member.to_string();

        retry("redis_zscore", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let member = member.clone();
            async move {
                let score: Option<f64> = conn.zscore(&key, &member).await?;
                Ok(score)
            }
        })
        .await
        .map_err(map_redis_err)
    }

    /// Pipelined SADD fan-out: one round trip for N tag registrations.
    async fn set_add_entries(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let conn = self.connection.clone();
        let prefixed: Vec<(String, String)> = entries
            .iter()
            .map(|(key, member)| (self.prefixed_key(key), member.clone()))
            .collect();

        retry("redis_sadd_batch", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let entries = prefixed.clone();
            async move {
                let mut pipeline = pipe();
                for (key, member) in &entries {
                    pipeline.sadd(key, member).ignore();
                }
                pipeline.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(map_redis_err)
    }

    /// Pipelined SREM fan-out, used when pruning stale tokens.
    async fn set_remove_entries(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let conn = self.connection.clone();
        let prefixed: Vec<(String, String)> = entries
            .iter()
            .map(|(key, member)| (self.prefixed_key(key), member.clone()))
            .collect();

        retry("redis_srem_batch", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let entries = prefixed.clone();
            async move {
                let mut pipeline = pipe();
                for (key, member) in &entries {
                    pipeline.srem(key, member).ignore();
                }
                pipeline.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(map_redis_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_clamps_subsecond() {
        // EXPIRE 0 would delete the key outright
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(30)), 30);
    }
}
