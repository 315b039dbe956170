use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use super::traits::{KeyValueStore, StoreError};

/// In-memory implementation of the store primitives.
///
/// Backs unit and behavior tests, and works as an embedded store when no
/// Redis is available. Semantics follow Redis where the tag engine depends on
/// them: type-checked access per key, collections disappear when their last
/// member is removed, TTLs are honored lazily on access.
pub struct InMemoryKvStore {
    data: DashMap<String, Slot>,
}

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    SortedSet(HashMap<String, f64>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Instant::now())
    }
}

fn wrong_type() -> StoreError {
    StoreError::Backend(
        "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
    )
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Current live key count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.value().expired()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all keys.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Lazy TTL: reap the key if its slot has expired.
    fn reap(&self, key: &str) {
        self.data.remove_if(key, |_, slot| slot.expired());
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn key_exists(&self, key: &str) -> Result<bool, StoreError> {
        self.reap(key);
        Ok(self.data.contains_key(key))
    }

    async fn key_delete(&self, key: &str) -> Result<bool, StoreError> {
        self.reap(key);
        Ok(self.data.remove(key).is_some())
    }

    async fn key_expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.reap(key);
        match self.data.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn key_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.reap(key);
        Ok(self.data.get(key).and_then(|slot| {
            slot.expires_at
                .map(|t| t.saturating_duration_since(Instant::now()))
        }))
    }

    async fn string_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(wrong_type()),
            },
            None => Ok(None),
        }
    }

    async fn string_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        // SET overwrites any existing value and resets the TTL
        self.data
            .insert(key.to_string(), Slot::new(Value::Str(value.to_string()), ttl));
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Hash(h) => Ok(h.get(field).cloned()),
                _ => Err(wrong_type()),
            },
            None => Ok(None),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.reap(key);
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut o) => match &mut o.get_mut().value {
                Value::Hash(h) => {
                    h.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type()),
            },
            MapEntry::Vacant(v) => {
                let mut h = HashMap::new();
                h.insert(field.to_string(), value.to_string());
                v.insert(Slot::new(Value::Hash(h), None));
                Ok(())
            }
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.reap(key);
        let mut removed = false;
        let mut now_empty = false;
        match self.data.get_mut(key) {
            Some(mut slot) => match &mut slot.value {
                Value::Hash(h) => {
                    removed = h.remove(field).is_some();
                    now_empty = h.is_empty();
                }
                _ => return Err(wrong_type()),
            },
            None => return Ok(false),
        }
        if now_empty {
            self.data.remove(key);
        }
        Ok(removed)
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Hash(h) => Ok(h.contains_key(field)),
                _ => Err(wrong_type()),
            },
            None => Ok(false),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.reap(key);
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut o) => match &mut o.get_mut().value {
                Value::Set(s) => Ok(s.insert(member.to_string())),
                _ => Err(wrong_type()),
            },
            MapEntry::Vacant(v) => {
                let mut s = HashSet::new();
                s.insert(member.to_string());
                v.insert(Slot::new(Value::Set(s), None));
                Ok(true)
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.reap(key);
        let mut removed = false;
        let mut now_empty = false;
        match self.data.get_mut(key) {
            Some(mut slot) => match &mut slot.value {
                Value::Set(s) => {
                    removed = s.remove(member);
                    now_empty = s.is_empty();
                }
                _ => return Err(wrong_type()),
            },
            None => return Ok(false),
        }
        if now_empty {
            self.data.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Set(s) => Ok(s.iter().cloned().collect()),
                _ => Err(wrong_type()),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Set(s) => Ok(s.contains(member)),
                _ => Err(wrong_type()),
            },
            None => Ok(false),
        }
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StoreError> {
        self.reap(key);
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut o) => match &mut o.get_mut().value {
                // ZADD returns the number of *new* members; a score update is 0
                Value::SortedSet(z) => Ok(z.insert(member.to_string(), score).is_none()),
                _ => Err(wrong_type()),
            },
            MapEntry::Vacant(v) => {
                let mut z = HashMap::new();
                z.insert(member.to_string(), score);
                v.insert(Slot::new(Value::SortedSet(z), None));
                Ok(true)
            }
        }
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.reap(key);
        let mut removed = false;
        let mut now_empty = false;
        match self.data.get_mut(key) {
            Some(mut slot) => match &mut slot.value {
                Value::SortedSet(z) => {
                    removed = z.remove(member).is_some();
                    now_empty = z.is_empty();
                }
                _ => return Err(wrong_type()),
            },
            None => return Ok(false),
        }
        if now_empty {
            self.data.remove(key);
        }
        Ok(removed)
    }

    async fn sorted_set_score(
        &self,
        key: &str,
        member: &str,
    ) -> Result<Option<f64>, StoreError> {
        self.reap(key);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::SortedSet(z) => Ok(z.get(member).copied()),
                _ => Err(wrong_type()),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryKvStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_string_set_and_get() {
        let store = InMemoryKvStore::new();
        store.string_set("k", "v", None).await.unwrap();
        assert_eq!(store.string_get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.key_exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryKvStore::new();
        assert!(store.string_get("missing").await.unwrap().is_none());
        assert!(!store.key_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryKvStore::new();
        assert!(!store.key_delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_field_lifecycle() {
        let store = InMemoryKvStore::new();
        store.hash_set("h", "f1", "v1").await.unwrap();
        store.hash_set("h", "f2", "v2").await.unwrap();

        assert!(store.hash_field_exists("h", "f1").await.unwrap());
        assert_eq!(store.hash_get("h", "f2").await.unwrap().as_deref(), Some("v2"));

        assert!(store.hash_delete("h", "f1").await.unwrap());
        assert!(!store.hash_field_exists("h", "f1").await.unwrap());
        // f2 untouched
        assert!(store.hash_field_exists("h", "f2").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_collection_key_vanishes() {
        let store = InMemoryKvStore::new();
        store.set_add("s", "only").await.unwrap();
        assert!(store.key_exists("s").await.unwrap());

        store.set_remove("s", "only").await.unwrap();
        assert!(!store.key_exists("s").await.unwrap());

        store.hash_set("h", "f", "v").await.unwrap();
        store.hash_delete("h", "f").await.unwrap();
        assert!(!store.key_exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_add_is_idempotent() {
        let store = InMemoryKvStore::new();
        assert!(store.set_add("s", "m").await.unwrap());
        assert!(!store.set_add("s", "m").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sorted_set_score_probe() {
        let store = InMemoryKvStore::new();
        assert!(store.sorted_set_add("z", "m", 1.0).await.unwrap());
        // Score update is not a new member
        assert!(!store.sorted_set_add("z", "m", 2.0).await.unwrap());
        assert_eq!(store.sorted_set_score("z", "m").await.unwrap(), Some(2.0));
        assert_eq!(store.sorted_set_score("z", "other").await.unwrap(), None);

        assert!(store.sorted_set_remove("z", "m").await.unwrap());
        assert_eq!(store.sorted_set_score("z", "m").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_access_errors() {
        let store = InMemoryKvStore::new();
        store.string_set("k", "v", None).await.unwrap();

        let err = store.set_add("k", "m").await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));

        let err = store.hash_get("k", "f").await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[tokio::test]
    async fn test_ttl_expires_lazily() {
        let store = InMemoryKvStore::new();
        store
            .string_set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.key_exists("k").await.unwrap());
        assert!(store.key_ttl("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.key_exists("k").await.unwrap());
        assert!(store.string_get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_expire_on_existing_key() {
        let store = InMemoryKvStore::new();
        store.hash_set("h", "f", "v").await.unwrap();
        assert!(store
            .key_expire("h", Duration::from_millis(20))
            .await
            .unwrap());
        assert!(!store
            .key_expire("missing", Duration::from_millis(20))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.hash_field_exists("h", "f").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_clears_ttl() {
        let store = InMemoryKvStore::new();
        store
            .string_set("k", "v1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.string_set("k", "v2", None).await.unwrap();
        assert_eq!(store.string_get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(store.key_ttl("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_entry_defaults() {
        let store = InMemoryKvStore::new();
        let entries = vec![
            ("a".to_string(), "m1".to_string()),
            ("b".to_string(), "m1".to_string()),
            ("a".to_string(), "m2".to_string()),
        ];
        store.set_add_entries(&entries).await.unwrap();
        assert_eq!(store.set_members("a").await.unwrap().len(), 2);
        assert_eq!(store.set_members("b").await.unwrap().len(), 1);

        store
            .set_remove_entries(&[("a".to_string(), "m1".to_string())])
            .await
            .unwrap();
        assert_eq!(store.set_members("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_set_adds() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryKvStore::new());
        let mut handles = vec![];

        for task in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store
                        .set_add("shared", &format!("member-{}-{}", task, i))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.set_members("shared").await.unwrap().len(), 100);
    }
}
