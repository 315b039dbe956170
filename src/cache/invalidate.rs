//! Invalidation cascade: tag → delete every referenced entity → drop the tag.

use tracing::{debug, warn};

use crate::entity::{EntityRef, MemberKind};
use crate::metrics::{self, LatencyTimer};
use crate::storage::traits::StoreError;

use super::{TagCache, TagCacheError};

/// Structured outcome of an invalidation pass.
///
/// Invalidation is a multi-step workflow with no rollback, so the result is
/// a ledger rather than a boolean: which references were deleted, which
/// failed (and why), and whether the tag sets themselves were cleared.
#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    /// References whose entities were deleted (or were already gone).
    pub invalidated: Vec<EntityRef>,
    /// References whose deletion hit a store error.
    pub failed: Vec<FailedDelete>,
    /// Tokens that did not decode; they cannot map to a delete primitive and
    /// are discarded together with the tag set.
    pub skipped_malformed: Vec<String>,
    /// Whether the tag sets were dropped. Only true when `failed` is empty.
    pub tags_cleared: bool,
}

impl InvalidationReport {
    /// Number of references whose deletion was attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.invalidated.len() + self.failed.len()
    }

    /// True when every referenced entity was deleted and the tags cleared.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One reference that survived an invalidation attempt.
#[derive(Debug, Clone)]
pub struct FailedDelete {
    /// The raw token, so a retry targets exactly this reference.
    pub token: String,
    /// Store error text for the failed delete.
    pub error: String,
}

impl TagCache {
    /// Delete every entity referenced by any of `tags`, then drop the tags
    /// themselves (token sets and registry entries).
    ///
    /// Deletion of all references is *attempted* before any tag set is
    /// cleared. On partial failure the call returns
    /// [`TagCacheError::PartialInvalidation`] with the full report:
    /// already-deleted entities stay deleted, the tag sets are kept, and
    /// re-invoking the same invalidation is safe - deletes of already-gone
    /// entities are no-ops.
    ///
    /// Not atomic: a reader running concurrently can observe a tag set whose
    /// entities are partially deleted.
    pub async fn invalidate_by_tag(
        &self,
        tags: &[&str],
    ) -> Result<InvalidationReport, TagCacheError> {
        let _timer = LatencyTimer::new("invalidate");

        let tokens = self.index.members(tags).await?;
        let mut report = InvalidationReport::default();

        for token in tokens {
            let entity = match EntityRef::decode(&token) {
                Ok(entity) => entity,
                Err(err) => {
                    warn!(%err, "dropping undecodable token during invalidation");
                    report.skipped_malformed.push(token);
                    continue;
                }
            };
            match self.delete_entity(&entity).await {
                Ok(_) => report.invalidated.push(entity),
                Err(err) => {
                    warn!(%entity, %err, "entity deletion failed during invalidation");
                    report.failed.push(FailedDelete {
                        token,
                        error: err.to_string(),
                    });
                }
            }
        }

        metrics::record_invalidated(report.invalidated.len());

        if report.failed.is_empty() {
            for tag in tags {
                self.index.delete_tag(tag).await?;
            }
            report.tags_cleared = true;
            debug!(
                tags = tags.len(),
                entities = report.invalidated.len(),
                "invalidation complete"
            );
            metrics::record_operation("invalidate", "success");
            Ok(report)
        } else {
            metrics::record_invalidation_failures(report.failed.len());
            metrics::record_operation("invalidate", "error");
            Err(TagCacheError::PartialInvalidation { report })
        }
    }

    /// Delete the entity behind a reference via the kind-appropriate
    /// primitive. Returns whether anything was actually removed.
    pub(super) async fn delete_entity(&self, entity: &EntityRef) -> Result<bool, StoreError> {
        let key = entity.container_key.as_str();
        let member = entity.member.as_deref().unwrap_or("");
        match entity.kind {
            MemberKind::StringKey => self.store.key_delete(key).await,
            MemberKind::HashField => self.store.hash_delete(key, member).await,
            MemberKind::SetMember => self.store.set_remove(key, member).await,
            MemberKind::SortedSetMember | MemberKind::GeoMember => {
                self.store.sorted_set_remove(key, member).await
            }
        }
    }
}
