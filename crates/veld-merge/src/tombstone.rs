//! Tombstone lifecycle for deleted instances.
//!
//! A tombstone is the terminal, exclusive alternate representation of an
//! instance identity: while it exists, no instance payload exists for that
//! identity, and vice versa. It carries exactly four facts.
//!
//! # Lifecycle
//!
//! ```text
//!            archive (direct deletion or archiving snapshot)
//!  ┌────────┐ ─────────────────────────────────────────────► ┌────────────┐
//!  │ Active │                                                │ Tombstoned │
//!  └────────┘ ◄───────────────────────────────────────────── └────────────┘
//!            revive (materializing snapshot merge only)
//! ```
//!
//! Re-archiving an already-tombstoned identity overwrites the four facts in
//! place; it never duplicates them. Revival happens only through a
//! materializing snapshot merge, never through a direct API, and removes the
//! facts atomically with the payload insertion (the store's `save` is the
//! implicit undelete).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veld_core::{AuthorityId, InstanceId};

use crate::error::{MergeError, Result};
use crate::instance::{Instance, PublicationStatus};
use crate::snapshot::ProductType;
use crate::store::{DisplayConfigurationStore, InstanceStore};

/// Marker discriminating tombstone records on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TombstoneMarker {
    /// The only marker value.
    Tombstone,
}

/// The four facts that replace a deleted instance's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Marker type discriminating this record.
    pub marker: TombstoneMarker,
    /// When the instance was deleted.
    pub deleted_at: DateTime<Utc>,
    /// Product type the instance had before deletion, if known.
    pub former_type: Option<ProductType>,
    /// Publication status the instance had before deletion.
    pub last_publication_status: PublicationStatus,
}

impl Tombstone {
    /// Builds the tombstone for a currently active instance.
    #[must_use]
    pub fn for_instance(instance: &Instance, now: DateTime<Utc>) -> Self {
        Self {
            marker: TombstoneMarker::Tombstone,
            deleted_at: now,
            former_type: instance.payload.product_type,
            last_publication_status: instance.publication_status,
        }
    }

    /// Builds a tombstone for an identity that was never materialized.
    ///
    /// An archiving snapshot can arrive before any materializing one; the
    /// former facts are unknown in that case.
    #[must_use]
    pub const fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            marker: TombstoneMarker::Tombstone,
            deleted_at: now,
            former_type: None,
            last_publication_status: PublicationStatus::Unpublished,
        }
    }

    /// Returns a copy with a refreshed deletion timestamp, preserving the
    /// former-state facts. This is the idempotent re-archive overwrite.
    #[must_use]
    pub fn refreshed(&self, now: DateTime<Utc>) -> Self {
        Self {
            deleted_at: now,
            ..self.clone()
        }
    }

    /// Renders the four facts as (name, value) pairs, in a stable order.
    #[must_use]
    pub fn facts(&self) -> [(&'static str, String); 4] {
        [
            ("type", "tombstone".to_string()),
            ("deletedAt", self.deleted_at.to_rfc3339()),
            (
                "formerType",
                self.former_type
                    .map_or_else(|| "unknown".to_string(), |t| t.as_str().to_string()),
            ),
            (
                "lastPublicationStatus",
                self.last_publication_status.as_str().to_string(),
            ),
        ]
    }
}

/// The externally observable state of one instance identity.
///
/// Exactly one of the two representations exists at any time.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceState {
    /// Payload present; the instance is live.
    Active(Instance),
    /// Four marker facts present; the instance is deleted.
    Tombstoned(Tombstone),
}

impl InstanceState {
    /// Returns true if the identity is live.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Returns true if the identity is deleted.
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        matches!(self, Self::Tombstoned(_))
    }

    /// Returns the live instance, if any.
    #[must_use]
    pub const fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Active(instance) => Some(instance),
            Self::Tombstoned(_) => None,
        }
    }

    /// Returns the tombstone, if any.
    #[must_use]
    pub const fn as_tombstone(&self) -> Option<&Tombstone> {
        match self {
            Self::Active(_) => None,
            Self::Tombstoned(tombstone) => Some(tombstone),
        }
    }
}

/// Creates, queries, and reverses tombstone state for instance identities.
///
/// Used by the snapshot merger for archiving snapshots and directly for
/// deletion requests outside the snapshot path. Both paths share the same
/// transition code so the display-flag bookkeeping stays consistent.
#[derive(Clone)]
pub struct TombstoneLifecycle {
    instances: Arc<dyn InstanceStore>,
    display: Arc<dyn DisplayConfigurationStore>,
}

impl std::fmt::Debug for TombstoneLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TombstoneLifecycle").finish_non_exhaustive()
    }
}

impl TombstoneLifecycle {
    /// Creates a new lifecycle over the given stores.
    #[must_use]
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        display: Arc<dyn DisplayConfigurationStore>,
    ) -> Self {
        Self { instances, display }
    }

    /// Archives an instance on a direct deletion request.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::NotFound`] if the identity is not currently
    /// active; direct deletion never re-archives a tombstone.
    pub async fn archive(
        &self,
        authority: &AuthorityId,
        id: InstanceId,
        now: DateTime<Utc>,
    ) -> Result<Tombstone> {
        let Some(instance) = self.instances.find(authority, id).await? else {
            return Err(MergeError::not_found("instance", id));
        };
        self.entomb(authority, &instance, now).await
    }

    /// Replaces an active instance's payload with tombstone facts and
    /// recomputes the display flag for its prior concept.
    pub(crate) async fn entomb(
        &self,
        authority: &AuthorityId,
        instance: &Instance,
        now: DateTime<Utc>,
    ) -> Result<Tombstone> {
        let tombstone = Tombstone::for_instance(instance, now);
        self.instances
            .delete(authority, instance.id, tombstone.clone())
            .await?;

        if let Some(concept_id) = instance.concept_id {
            let in_use = self.instances.any_with_concept(authority, concept_id).await?;
            self.display
                .sync_instantiated_flag(authority, concept_id, in_use)
                .await?;
        }

        tracing::info!(
            authority = %authority,
            instance = %instance.id,
            "Instance archived"
        );

        Ok(tombstone)
    }

    /// Overwrites existing tombstone facts in place (idempotent re-archive).
    pub(crate) async fn overwrite(
        &self,
        authority: &AuthorityId,
        id: InstanceId,
        previous: &Tombstone,
        now: DateTime<Utc>,
    ) -> Result<Tombstone> {
        let tombstone = previous.refreshed(now);
        self.instances.delete(authority, id, tombstone.clone()).await?;
        Ok(tombstone)
    }

    /// Returns true if the identity currently holds a tombstone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn is_tombstoned(&self, authority: &AuthorityId, id: InstanceId) -> Result<bool> {
        Ok(self
            .instances
            .state(authority, id)
            .await?
            .is_some_and(|state| state.is_tombstoned()))
    }
}
