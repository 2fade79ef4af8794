//! Instance data model: the current materialized description per identity.
//!
//! One instance exists per `is_version_of` identity per authority. The
//! instance's own `id`/`uuid` are stable across its entire lifetime: created
//! once on the first merge, then only field-replaced. Nested entities, in
//! contrast, are rebuilt with fresh identity on every merge.
//!
//! # Workflow attributes
//!
//! On top of the descriptive payload, an instance tracks where it sits in
//! the authoring/publication workflow (`status`, `publication_status`,
//! `review_status`) and the associated timestamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veld_core::{AuthorityId, ConceptId, InstanceId};

use crate::snapshot::{ServicePayload, Snapshot, UnknownVariant};

/// Authoring status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceStatus {
    /// Being edited by the authority.
    Draft,
    /// Sent for publication.
    Sent,
}

impl InstanceStatus {
    /// Returns the wire representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            other => Err(UnknownVariant {
                kind: "instance status",
                value: other.to_string(),
            }),
        }
    }
}

/// Publication status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublicationStatus {
    /// Never published.
    Unpublished,
    /// Published and current.
    Published,
    /// Published before, changed since; awaiting republication.
    PendingRepublish,
}

impl PublicationStatus {
    /// Returns the wire representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unpublished => "unpublished",
            Self::Published => "published",
            Self::PendingRepublish => "pendingRepublish",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpublished" => Ok(Self::Unpublished),
            "published" => Ok(Self::Published),
            "pendingRepublish" => Ok(Self::PendingRepublish),
            other => Err(UnknownVariant {
                kind: "publication status",
                value: other.to_string(),
            }),
        }
    }
}

/// Review status flagged on an instance when its source concept changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewStatus {
    /// The linked concept was updated after this instance was created.
    ConceptChanged,
}

impl ReviewStatus {
    /// Returns the wire representation of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConceptChanged => "conceptChanged",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conceptChanged" => Ok(Self::ConceptChanged),
            other => Err(UnknownVariant {
                kind: "review status",
                value: other.to_string(),
            }),
        }
    }
}

/// The current materialized, mutable public-service description for one
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Stable identity, equal to the snapshots' `is_version_of`.
    pub id: InstanceId,
    /// Stable UUID, minted once on first materialization.
    pub uuid: Uuid,
    /// Authority that owns this instance.
    pub created_by: AuthorityId,
    /// Concept template the instance is linked to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<ConceptId>,
    /// The full descriptive payload.
    #[serde(flatten)]
    pub payload: ServicePayload,
    /// Authoring status.
    pub status: InstanceStatus,
    /// Publication status.
    pub publication_status: PublicationStatus,
    /// Review status, set when the linked concept changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    /// When the instance was first materialized.
    pub date_created: DateTime<Utc>,
    /// When the instance was last modified.
    pub date_modified: DateTime<Utc>,
    /// When the instance was last sent for publication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_sent: Option<DateTime<Utc>>,
    /// When the instance was last published. Untouched by merges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
}

impl Instance {
    /// Materializes a brand-new instance from a snapshot.
    ///
    /// The instance adopts the snapshot's `is_version_of` as its identity and
    /// mints a fresh UUID. The payload is NOT copied here; the merger rebuilds
    /// it with fresh nested identity via [`crate::remap`].
    #[must_use]
    pub fn materialize(snapshot: &Snapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: snapshot.is_version_of,
            uuid: Uuid::new_v4(),
            created_by: snapshot.created_by.clone(),
            concept_id: snapshot.concept_id,
            payload: ServicePayload::default(),
            status: InstanceStatus::Sent,
            publication_status: PublicationStatus::Unpublished,
            review_status: None,
            date_created: now,
            date_modified: now,
            date_sent: Some(now),
            date_published: None,
        }
    }

    /// Returns true if the instance was ever published.
    #[must_use]
    pub const fn was_published(&self) -> bool {
        matches!(
            self.publication_status,
            PublicationStatus::Published | PublicationStatus::PendingRepublish
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_core::InstanceId;

    fn authority() -> AuthorityId {
        AuthorityId::new("gemeente-aarschot").unwrap()
    }

    #[test]
    fn statuses_roundtrip_through_wire_strings() {
        for status in [InstanceStatus::Draft, InstanceStatus::Sent] {
            assert_eq!(status.as_str().parse::<InstanceStatus>().unwrap(), status);
        }
        for status in [
            PublicationStatus::Unpublished,
            PublicationStatus::Published,
            PublicationStatus::PendingRepublish,
        ] {
            assert_eq!(
                status.as_str().parse::<PublicationStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!("archived".parse::<InstanceStatus>().is_err());
        assert!("republished".parse::<PublicationStatus>().is_err());
        assert!("needsWork".parse::<ReviewStatus>().is_err());
    }

    #[test]
    fn materialize_adopts_snapshot_identity() {
        let instance_id = InstanceId::generate();
        let snapshot = Snapshot::new(instance_id, Utc::now(), authority());
        let now = Utc::now();

        let instance = Instance::materialize(&snapshot, now);

        assert_eq!(instance.id, instance_id);
        assert_eq!(instance.status, InstanceStatus::Sent);
        assert_eq!(instance.publication_status, PublicationStatus::Unpublished);
        assert_eq!(instance.date_sent, Some(now));
        assert!(instance.date_published.is_none());
    }

    #[test]
    fn was_published_covers_pending_republish() {
        let snapshot = Snapshot::new(InstanceId::generate(), Utc::now(), authority());
        let mut instance = Instance::materialize(&snapshot, Utc::now());
        assert!(!instance.was_published());

        instance.publication_status = PublicationStatus::PendingRepublish;
        assert!(instance.was_published());
    }
}
