// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tag-scoped reads and the lazy cleanup protocol.

use tracing::debug;

use crate::entity::{EntityRef, MemberKind};
use crate::metrics::{self, LatencyTimer};
use crate::storage::traits::StoreError;

use super::{TagCache, TagCacheError};

/// Read-time consistency mode, chosen per call so the cost model stays
/// visible at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cleanup {
    /// Trust the index as-is. One round trip per tag; the result may include
    /// references whose entity expired, was deleted out-of-band, or was
    /// never real (an injected token).
    #[default]
    Off,
    /// Existence-check every reference against the primary store and prune
    /// the stale ones from the queried tag sets before returning. Costs one
    /// probe per candidate plus one pipelined removal pass.
    Prune,
}

/// One member of a resolved tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMember {
    /// A token that decoded into an entity reference.
    Entity(EntityRef),
    /// A token that did not decode, returned verbatim. Only produced on the
    /// fast path - the fast path stays best-effort rather than paying
    /// validation cost or failing the whole read.
    Opaque(String),
}

impl ResolvedMember {
    /// The decoded reference, if this member decoded.
    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Opaque(_) => None,
        }
    }

    /// The underlying index token.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::Entity(entity) => entity.encode(),
            Self::Opaque(token) => token.clone(),
        }
    }
}

impl TagCache {
    /// Resolve the union of entities referenced by any of `tags`.
    ///
    /// With [`Cleanup::Off`] the candidate tokens come back as-is, decoded
    /// best-effort. With [`Cleanup::Prune`] every reference is verified
    /// against the primary store; stale tokens are removed from each queried
    /// tag set as a side effect, so a later fast read no longer sees them.
    /// In prune mode an undecodable token is a data error
    /// ([`TagCacheError::InvalidEntityReference`]) - it cannot be probed.
    pub async fn resolve_by_tag(
        &self,
        tags: &[&str],
        cleanup: Cleanup,
    ) -> Result<Vec<ResolvedMember>, TagCacheError> {
        let _timer = LatencyTimer::new("resolve");

        let tokens = self.index.members(tags).await?;
        metrics::record_resolve_size(tokens.len());

        match cleanup {
            Cleanup::Off => Ok(tokens
                .into_iter()
                .map(|token| match EntityRef::decode(&token) {
                    Ok(entity) => ResolvedMember::Entity(entity),
                    Err(_) => ResolvedMember::Opaque(token),
                })
                .collect()),
            Cleanup::Prune => {
                let mut live = Vec::with_capacity(tokens.len());
                let mut stale = Vec::new();

                for token in tokens {
                    let entity = EntityRef::decode(&token)?;
                    if self.entity_exists(&entity).await? {
                        live.push(ResolvedMember::Entity(entity));
                    } else {
                        stale.push(token);
                    }
                }

                if !stale.is_empty() {
                    self.index.remove_members(tags, &stale).await?;
                    metrics::record_pruned(stale.len());
                    debug!(
                        pruned = stale.len(),
                        live = live.len(),
                        "cleanup read pruned stale tokens"
                    );
                }

                Ok(live)
            }
        }
    }

    /// Existence probe at the decoded location. "Missing" is expected
    /// information here, not an error - it is what drives pruning.
    pub(super) async fn entity_exists(&self, entity: &EntityRef) -> Result<bool, StoreError> {
        let key = entity.container_key.as_str();
        let member = entity.member.as_deref().unwrap_or("");
        match entity.kind {
            MemberKind::StringKey => self.store.key_exists(key).await,
            MemberKind::HashField => self.store.hash_field_exists(key, member).await,
            MemberKind::SetMember => self.store.set_contains(key, member).await,
            MemberKind::SortedSetMember | MemberKind::GeoMember => {
                Ok(self.store.sorted_set_score(key, member).await?.is_some())
            }
        }
    }
}
