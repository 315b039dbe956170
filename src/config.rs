//! Configuration for the tag engine.
//!
//! # Example
//!
//! ```
//! use tag_cache::TagCacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = TagCacheConfig::default();
//! assert_eq!(config.tag_key_prefix, "tag:");
//!
//! // Full config
//! let config = TagCacheConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     key_prefix: Some("myapp:".into()),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the tag engine.
///
/// All fields have sensible defaults. For production use against Redis,
/// configure `redis_url`; set `key_prefix` when sharing the instance with
/// other applications.
#[derive(Debug, Clone, Deserialize)]
pub struct TagCacheConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix applied by the store backend to every key, primary entities
    /// and tag sets alike (e.g., "myapp:")
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Prefix turning a tag name into its tag-set key (default: "tag:")
    #[serde(default = "default_tag_key_prefix")]
    pub tag_key_prefix: String,

    /// Key of the side registry of tag names (default: "tags")
    #[serde(default = "default_tag_registry_key")]
    pub tag_registry_key: String,
}

fn default_tag_key_prefix() -> String {
    "tag:".to_string()
}

fn default_tag_registry_key() -> String {
    "tags".to_string()
}

impl Default for TagCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: None,
            tag_key_prefix: default_tag_key_prefix(),
            tag_registry_key: default_tag_registry_key(),
        }
    }
}
