//! Pluggable storage seams for the merge pipeline.
//!
//! The pipeline owns no persistence format; snapshots, instances, and display
//! configurations live behind the traits defined here. Implementations must
//! scope every operation to one authority partition.
//!
//! ## Design Principles
//!
//! - **Authority isolation**: no operation crosses authority partitions
//! - **Append-only processed set**: `mark_processed` never removes entries;
//!   it is idempotency bookkeeping, not an event log with offsets
//! - **Testability**: in-memory implementations in [`memory`] for tests and
//!   development
//!
//! ## Concurrency
//!
//! All trait methods are `Send + Sync`. The staleness check in the merger is
//! the conflict resolver for concurrent merges of the same identity; stores
//! only need last-writer-wins semantics per key.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use veld_core::{AuthorityId, ConceptId, InstanceId, SnapshotId, StreamId};

use crate::display::DisplayConfiguration;
use crate::error::Result;
use crate::instance::Instance;
use crate::snapshot::Snapshot;
use crate::tombstone::{InstanceState, Tombstone};

/// Resolves the set of authorities with isolated storage partitions.
#[async_trait]
pub trait AuthorityDirectory: Send + Sync {
    /// Returns every known authority.
    async fn authorities(&self) -> Result<Vec<AuthorityId>>;
}

/// Holds incoming snapshots and the per-partition processed set.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads a snapshot from the authority's partition.
    ///
    /// Returns a not-found error if no stream of this authority holds the
    /// snapshot. A snapshot stored under a different authority is invisible
    /// here; the merger treats the mismatch as a data inconsistency.
    async fn get(&self, authority: &AuthorityId, snapshot_id: SnapshotId) -> Result<Snapshot>;

    /// Returns the integrating-partner streams of an authority.
    async fn streams(&self, authority: &AuthorityId) -> Result<Vec<StreamId>>;

    /// Returns the snapshots of a partition not yet in its processed set.
    async fn list_unprocessed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
    ) -> Result<Vec<Snapshot>>;

    /// Adds a snapshot ID to the partition's processed set.
    ///
    /// The processed set is append-only; marking twice is a no-op.
    async fn mark_processed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
        snapshot_id: SnapshotId,
    ) -> Result<()>;

    /// Returns true if the snapshot ID is in the partition's processed set.
    async fn is_processed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
        snapshot_id: SnapshotId,
    ) -> Result<bool>;

    /// Returns the greatest `generated_at` among processed snapshots of the
    /// given instance identity, across all of the authority's streams.
    ///
    /// This drives the merger's staleness check.
    async fn latest_processed_generated_at(
        &self,
        authority: &AuthorityId,
        instance_id: InstanceId,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// Holds the current materialized instance (or tombstone) per identity.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Returns the live instance for an identity, if any.
    ///
    /// A tombstoned identity yields `None`; use [`InstanceStore::state`] for
    /// the raw representation.
    async fn find(&self, authority: &AuthorityId, id: InstanceId) -> Result<Option<Instance>>;

    /// Returns true if a live instance exists for the identity.
    async fn exists(&self, authority: &AuthorityId, id: InstanceId) -> Result<bool>;

    /// Returns the raw state of an identity: active, tombstoned, or absent.
    async fn state(&self, authority: &AuthorityId, id: InstanceId)
        -> Result<Option<InstanceState>>;

    /// Writes the live instance, replacing whatever state the identity held.
    ///
    /// Writing over a tombstone removes the tombstone facts atomically with
    /// the payload insertion; this is the implicit undelete.
    async fn save(&self, authority: &AuthorityId, instance: Instance) -> Result<()>;

    /// Replaces the identity's payload with tombstone facts.
    ///
    /// Overwrites an existing tombstone in place.
    async fn delete(
        &self,
        authority: &AuthorityId,
        id: InstanceId,
        tombstone: Tombstone,
    ) -> Result<()>;

    /// Returns true if any live instance of the authority references the
    /// concept. The display-flag recompute is defined over this scan.
    async fn any_with_concept(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<bool>;
}

/// Holds the per-(authority, concept) display configuration rows.
#[async_trait]
pub trait DisplayConfigurationStore: Send + Sync {
    /// Returns the configuration for a concept within an authority, if any.
    async fn find_by_concept(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<Option<DisplayConfiguration>>;

    /// Creates a configuration row for every known authority that does not
    /// have one yet. Existing rows are left untouched.
    async fn ensure_exists_for_all_authorities(&self, concept_id: ConceptId) -> Result<()>;

    /// Marks the concept instantiated for the authority, creating the row if
    /// needed. Clears the concept-is-new flag.
    async fn set_instantiated(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<()>;

    /// Applies the recomputed instantiated flag.
    ///
    /// `concept_in_use` is the caller's scan result over current instance
    /// state (see [`InstanceStore::any_with_concept`]).
    async fn sync_instantiated_flag(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
        concept_in_use: bool,
    ) -> Result<()>;
}
