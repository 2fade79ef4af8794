//! Snapshot merger: materializes one snapshot into the current instance.
//!
//! The merger is the only writer of instance state on the snapshot path. One
//! call merges one snapshot, atomically from the caller's perspective: the
//! next instance is built entirely in memory, validated, and only then
//! persisted. The merger never retries; retry is the batch runner's
//! responsibility.
//!
//! # Ordering
//!
//! Snapshots may arrive and be attempted in any order. The staleness check
//! compares this snapshot's `generated_at` against the greatest processed
//! one for the same identity: a strictly older snapshot is a deliberate
//! no-op that still reports success, so the caller can safely mark it
//! processed. This is what realizes eventual convergence to the
//! last-generated version without requiring strict delivery order. Equal
//! timestamps proceed; last writer wins.
//!
//! # Consistency
//!
//! Display-flag updates run after the instance write and are recomputed from
//! current instance state, so a failure between the two writes is healed by
//! the next successful merge touching the same concept.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use veld_core::{AuthorityId, SnapshotId};

use crate::codelist::AuthorityCodeList;
use crate::error::{MergeError, Result};
use crate::instance::{Instance, InstanceStatus, PublicationStatus};
use crate::metrics::{record_merge_failure, record_merge_success, record_stale_skip};
use crate::remap;
use crate::snapshot::Snapshot;
use crate::store::{DisplayConfigurationStore, InstanceStore, SnapshotStore};
use crate::tombstone::{InstanceState, Tombstone, TombstoneLifecycle};
use crate::validator::InstanceValidator;

/// What a successful merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First materialization of the identity.
    Created,
    /// Field-replacement of an existing instance.
    Updated,
    /// Re-materialization of a tombstoned identity.
    Revived,
    /// Tombstone written or overwritten.
    Archived,
    /// Deliberate no-op: a newer version was already processed.
    SkippedStale,
}

impl MergeOutcome {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Revived => "revived",
            Self::Archived => "archived",
            Self::SkippedStale => "skipped_stale",
        }
    }
}

/// Merges snapshots into materialized instances.
#[derive(Clone)]
pub struct SnapshotMerger {
    snapshots: Arc<dyn SnapshotStore>,
    instances: Arc<dyn InstanceStore>,
    display: Arc<dyn DisplayConfigurationStore>,
    codelist: Arc<dyn AuthorityCodeList>,
    validator: Arc<dyn InstanceValidator>,
    lifecycle: TombstoneLifecycle,
}

impl std::fmt::Debug for SnapshotMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotMerger").finish_non_exhaustive()
    }
}

impl SnapshotMerger {
    /// Creates a merger over the given collaborators.
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        instances: Arc<dyn InstanceStore>,
        display: Arc<dyn DisplayConfigurationStore>,
        codelist: Arc<dyn AuthorityCodeList>,
        validator: Arc<dyn InstanceValidator>,
    ) -> Self {
        let lifecycle = TombstoneLifecycle::new(Arc::clone(&instances), Arc::clone(&display));
        Self {
            snapshots,
            instances,
            display,
            codelist,
            validator,
            lifecycle,
        }
    }

    /// Returns the tombstone lifecycle sharing this merger's stores.
    ///
    /// Exposed for the direct deletion path outside the snapshot stream.
    #[must_use]
    pub fn lifecycle(&self) -> &TombstoneLifecycle {
        &self.lifecycle
    }

    /// Merges one snapshot into the current instance state.
    ///
    /// # Errors
    ///
    /// - [`MergeError::NotFound`] if the snapshot does not exist in the
    ///   authority's partition
    /// - [`MergeError::Invariant`] if the resulting instance would violate
    ///   publish invariants (nothing is written)
    /// - [`MergeError::System`] for upstream data inconsistencies, such as a
    ///   snapshot created by a different authority
    pub async fn merge(
        &self,
        authority: &AuthorityId,
        snapshot_id: SnapshotId,
    ) -> Result<MergeOutcome> {
        let result = self.merge_inner(authority, snapshot_id).await;
        match &result {
            Ok(MergeOutcome::SkippedStale) => record_stale_skip(authority.as_str()),
            Ok(outcome) => {
                record_merge_success(authority.as_str());
                tracing::info!(
                    authority = %authority,
                    snapshot = %snapshot_id,
                    outcome = outcome.as_str(),
                    "Snapshot merged"
                );
            }
            Err(err) => {
                record_merge_failure(authority.as_str(), err.kind());
                tracing::warn!(
                    authority = %authority,
                    snapshot = %snapshot_id,
                    kind = err.kind(),
                    error = %err,
                    "Snapshot merge failed"
                );
            }
        }
        result
    }

    async fn merge_inner(
        &self,
        authority: &AuthorityId,
        snapshot_id: SnapshotId,
    ) -> Result<MergeOutcome> {
        let snapshot = self.snapshots.get(authority, snapshot_id).await?;
        if snapshot.created_by != *authority {
            return Err(MergeError::system(format!(
                "snapshot {snapshot_id} was created by authority '{}' but found in partition of '{authority}'",
                snapshot.created_by
            )));
        }

        let state = self
            .instances
            .state(authority, snapshot.is_version_of)
            .await?;

        // A strictly newer processed version makes this snapshot stale. Only
        // checked when some state exists: on a blank identity even an old
        // snapshot is better than nothing, and the newer one will overwrite
        // it when it arrives.
        if state.is_some() {
            let latest = self
                .snapshots
                .latest_processed_generated_at(authority, snapshot.is_version_of)
                .await?;
            if latest.is_some_and(|latest| latest > snapshot.generated_at) {
                tracing::debug!(
                    authority = %authority,
                    snapshot = %snapshot_id,
                    instance = %snapshot.is_version_of,
                    "Skipping stale snapshot"
                );
                return Ok(MergeOutcome::SkippedStale);
            }
        }

        let now = Utc::now();
        if snapshot.is_archived {
            self.merge_archiving(authority, &snapshot, state, now).await
        } else {
            self.merge_materializing(authority, &snapshot, state.as_ref(), now)
                .await
        }
    }

    /// Replaces the instance payload with tombstone facts.
    async fn merge_archiving(
        &self,
        authority: &AuthorityId,
        snapshot: &Snapshot,
        state: Option<InstanceState>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        match state {
            Some(InstanceState::Active(instance)) => {
                self.lifecycle.entomb(authority, &instance, now).await?;
            }
            Some(InstanceState::Tombstoned(previous)) => {
                self.lifecycle
                    .overwrite(authority, snapshot.is_version_of, &previous, now)
                    .await?;
            }
            None => {
                // Archiving snapshot arrived before any materializing one.
                self.instances
                    .delete(authority, snapshot.is_version_of, Tombstone::unknown(now))
                    .await?;
            }
        }
        Ok(MergeOutcome::Archived)
    }

    /// Creates, updates, or revives the instance from the snapshot payload.
    async fn merge_materializing(
        &self,
        authority: &AuthorityId,
        snapshot: &Snapshot,
        state: Option<&InstanceState>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let (previous, reviving) = match state {
            Some(InstanceState::Active(instance)) => (Some(instance), false),
            Some(InstanceState::Tombstoned(_)) => (None, true),
            None => (None, false),
        };

        let mut next = match previous {
            Some(existing) => {
                let mut next = existing.clone();
                next.status = InstanceStatus::Sent;
                next.date_sent = Some(now);
                next.date_modified = now;
                if existing.publication_status == PublicationStatus::Published {
                    next.publication_status = PublicationStatus::PendingRepublish;
                }
                next
            }
            None => Instance::materialize(snapshot, now),
        };

        let previous_concept = previous.and_then(|i| i.concept_id);
        next.concept_id = snapshot.concept_id;
        next.payload = remap::rebuild_payload(&snapshot.payload);

        // External registry ensure runs before any write; its failure aborts
        // the merge with nothing persisted.
        for iri in next.payload.referenced_authority_iris() {
            self.codelist.ensure_exists(iri).await?;
        }

        let violations = self.validator.validate_for_publish(&next);
        if !violations.is_empty() {
            return Err(MergeError::Invariant { violations });
        }

        // Writing the active state is also the implicit undelete on revival.
        self.instances.save(authority, next).await?;

        self.sync_concept_links(authority, previous_concept, snapshot.concept_id)
            .await?;

        Ok(if reviving {
            MergeOutcome::Revived
        } else if previous.is_some() {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Created
        })
    }

    /// Updates display configurations for the old and new concept links.
    async fn sync_concept_links(
        &self,
        authority: &AuthorityId,
        previous: Option<veld_core::ConceptId>,
        next: Option<veld_core::ConceptId>,
    ) -> Result<()> {
        if previous == next {
            // Unchanged link; re-assert the flag so earlier partial failures
            // on this concept heal.
            if let Some(concept_id) = next {
                self.display.set_instantiated(authority, concept_id).await?;
            }
            return Ok(());
        }

        if let Some(old) = previous {
            let in_use = self.instances.any_with_concept(authority, old).await?;
            self.display
                .sync_instantiated_flag(authority, old, in_use)
                .await?;
        }

        if let Some(new) = next {
            self.display.ensure_exists_for_all_authorities(new).await?;
            self.display.set_instantiated(authority, new).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_core::{InstanceId, StreamId};

    use crate::codelist::{CachingCodeList, StaticRegistry};
    use crate::snapshot::LanguageMap;
    use crate::store::memory::{
        MemoryAuthorityDirectory, MemoryDisplayConfigurationStore, MemoryInstanceStore,
        MemorySnapshotStore,
    };
    use crate::validator::PublishValidator;

    fn authority() -> AuthorityId {
        AuthorityId::new("gemeente-aarschot").unwrap()
    }

    fn stream() -> StreamId {
        StreamId::new("partner-feed").unwrap()
    }

    struct Harness {
        snapshots: Arc<MemorySnapshotStore>,
        merger: SnapshotMerger,
    }

    fn harness() -> Harness {
        let directory = Arc::new(MemoryAuthorityDirectory::new(vec![authority()]));
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let instances = Arc::new(MemoryInstanceStore::new());
        let display = Arc::new(MemoryDisplayConfigurationStore::new(directory));
        let codelist = Arc::new(CachingCodeList::new(StaticRegistry));
        let merger = SnapshotMerger::new(
            Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
            instances,
            display,
            codelist,
            Arc::new(PublishValidator::new()),
        );
        Harness { snapshots, merger }
    }

    fn valid_snapshot(instance_id: InstanceId) -> Snapshot {
        let mut snapshot = Snapshot::new(instance_id, Utc::now(), authority());
        snapshot.payload.title = LanguageMap::with("nl", "Parkeerkaart");
        snapshot.payload.description = LanguageMap::with("nl", "Een kaart om te parkeren");
        snapshot
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_found() {
        let h = harness();
        let err = h
            .merger
            .merge(&authority(), SnapshotId::generate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn foreign_snapshot_in_partition_is_a_system_error() {
        let h = harness();
        let mut snapshot = valid_snapshot(InstanceId::generate());
        snapshot.created_by = AuthorityId::new("stad-leuven").unwrap();
        let id = snapshot.id;
        h.snapshots.append(&authority(), &stream(), snapshot).unwrap();

        let err = h.merger.merge(&authority(), id).await.unwrap_err();
        assert_eq!(err.kind(), "system");
    }

    #[tokio::test]
    async fn first_merge_creates_the_instance() {
        let h = harness();
        let snapshot = valid_snapshot(InstanceId::generate());
        let id = snapshot.id;
        h.snapshots.append(&authority(), &stream(), snapshot).unwrap();

        let outcome = h.merger.merge(&authority(), id).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Created);
    }
}
