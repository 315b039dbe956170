//! # Tag Cache
//!
//! Tag-based secondary indexing for Redis-backed caches: attach arbitrary
//! string labels to cached entities - whole keys, hash fields, set and
//! sorted-set members - and resolve or invalidate everything sharing a tag
//! in one call.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TagCache                             │
//! │  • set_with_tags: primary write, then index registration    │
//! │  • resolve_by_tag: union of tag sets, opt-in cleanup        │
//! │  • invalidate_by_tag: delete entities, then drop the tags   │
//! └─────────────────────────────────────────────────────────────┘
//!               │                              │
//!               ▼                              ▼
//! ┌───────────────────────────┐  ┌─────────────────────────────┐
//! │      Entity codec         │  │       TagIndexStore         │
//! │  (key, kind, member)      │  │  tag → set of tokens        │
//! │   ⇄ one flat token        │  │  + side registry of names   │
//! └───────────────────────────┘  └─────────────────────────────┘
//!                                              │
//!                                              ▼
//!                                ┌─────────────────────────────┐
//!                                │       KeyValueStore         │
//!                                │  Redis (pipelined) / memory │
//!                                └─────────────────────────────┘
//! ```
//!
//! The reverse index lives in ordinary store sets, kept consistent with
//! primary data through ordering (write-then-index) and idempotence rather
//! than transactions. Entities that expire or are deleted out-of-band leave
//! stale tokens behind; that staleness window is part of the contract, and
//! cleanup-mode reads reconcile it on demand - there is no background
//! sweeper.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tag_cache::{Cleanup, EntityWrite, TagCache, TagCacheConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TagCacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!
//!     let cache = TagCache::connect(config).await.expect("Failed to connect");
//!
//!     // Tag a key and a hash field
//!     cache
//!         .set_with_tags(
//!             EntityWrite::String { key: "user:42", value: "ada" },
//!             &["users", "region:eu"],
//!             None,
//!         )
//!         .await
//!         .expect("Failed to write");
//!     cache
//!         .set_with_tags(
//!             EntityWrite::HashField { key: "session:9", field: "user:42", value: "live" },
//!             &["region:eu"],
//!             None,
//!         )
//!         .await
//!         .expect("Failed to write");
//!
//!     // Everything in the EU region, verified against the store
//!     let members = cache
//!         .resolve_by_tag(&["region:eu"], Cleanup::Prune)
//!         .await
//!         .expect("Failed to resolve");
//!     println!("{} live entities", members.len());
//!
//!     // Drop all users and the tag itself
//!     cache.invalidate_by_tag(&["users"]).await.expect("Failed to invalidate");
//! }
//! ```
//!
//! ## Features
//!
//! - **Heterogeneous references**: one token encoding covers plain keys,
//!   hash fields, set, sorted-set and geo members
//! - **Pipelined registration**: one round trip to tag an entity under N tags
//! - **Lazy cleanup**: staleness is reconciled by opt-in reads, never by a
//!   write-side cost proportional to expiration
//! - **Retry-safe invalidation**: structured partial results, tag sets kept
//!   until every referenced deletion succeeded
//! - **Pluggable store**: Redis with retry/pipelining, or in-memory for tests
//!
//! ## Modules
//!
//! - [`cache`]: the [`TagCache`] engine (write, resolve, invalidate paths)
//! - [`entity`]: entity references and the token codec
//! - [`index`]: the reverse index over tag sets plus the name registry
//! - [`storage`]: store primitives and backends (Redis, memory)
//! - [`resilience`]: per-command retry for the store client
//! - [`metrics`]: `metrics`-facade instrumentation

pub mod cache;
pub mod config;
pub mod entity;
pub mod index;
pub mod metrics;
pub mod resilience;
pub mod storage;

pub use cache::{
    Cleanup, FailedDelete, InvalidationReport, ResolvedMember, TagCache, TagCacheError,
};
pub use config::TagCacheConfig;
pub use entity::{EntityRef, EntityWrite, InvalidToken, MemberKind};
pub use index::TagIndexStore;
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use storage::memory::InMemoryKvStore;
pub use storage::redis::RedisKvStore;
pub use storage::traits::{KeyValueStore, StoreError};
