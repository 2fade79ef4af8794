//! Per-(authority, concept) display configuration.
//!
//! Display configurations carry the denormalized flags the authoring UI uses
//! to decorate concept templates: whether the concept is new to the authority
//! and whether the authority has instantiated it. The flags are mutually
//! exclusive; the transition methods are the only way to change them.
//!
//! The instantiated flag is always recomputable from current instance state
//! (does any instance of this authority reference the concept), which is what
//! makes partial failures self-healing: the next merge that touches the same
//! concept recomputes and overwrites it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veld_core::{AuthorityId, ConceptId};

/// Denormalized per-(authority, concept) display flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfiguration {
    /// Authority this configuration belongs to.
    pub authority: AuthorityId,
    /// Concept this configuration describes.
    pub concept_id: ConceptId,
    /// True while the concept has never been seen by this authority.
    concept_is_new: bool,
    /// True while at least one instance of this authority references the concept.
    concept_is_instantiated: bool,
    /// When the configuration last changed.
    pub updated_at: DateTime<Utc>,
}

impl DisplayConfiguration {
    /// Creates the initial configuration for a concept newly visible to an
    /// authority: new, not instantiated.
    #[must_use]
    pub fn new_for(authority: AuthorityId, concept_id: ConceptId, now: DateTime<Utc>) -> Self {
        Self {
            authority,
            concept_id,
            concept_is_new: true,
            concept_is_instantiated: false,
            updated_at: now,
        }
    }

    /// Returns true while the concept is new to the authority.
    #[must_use]
    pub const fn concept_is_new(&self) -> bool {
        self.concept_is_new
    }

    /// Returns true while the concept is instantiated by the authority.
    #[must_use]
    pub const fn concept_is_instantiated(&self) -> bool {
        self.concept_is_instantiated
    }

    /// Marks the concept as instantiated. Clears the new flag: the two are
    /// mutually exclusive.
    pub fn mark_instantiated(&mut self, now: DateTime<Utc>) {
        self.concept_is_new = false;
        self.concept_is_instantiated = true;
        self.updated_at = now;
    }

    /// Applies the recomputed instantiated flag.
    ///
    /// `concept_in_use` is the result of scanning current instances for a
    /// reference to this concept. Clearing instantiation does not make the
    /// concept new again.
    pub fn sync_instantiated(&mut self, concept_in_use: bool, now: DateTime<Utc>) {
        if concept_in_use {
            self.mark_instantiated(now);
        } else {
            self.concept_is_instantiated = false;
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DisplayConfiguration {
        DisplayConfiguration::new_for(
            AuthorityId::new("gemeente-aarschot").unwrap(),
            ConceptId::generate(),
            Utc::now(),
        )
    }

    #[test]
    fn starts_new_and_not_instantiated() {
        let config = config();
        assert!(config.concept_is_new());
        assert!(!config.concept_is_instantiated());
    }

    #[test]
    fn instantiation_clears_new_flag() {
        let mut config = config();
        config.mark_instantiated(Utc::now());

        assert!(!config.concept_is_new());
        assert!(config.concept_is_instantiated());
    }

    #[test]
    fn flags_are_never_both_true() {
        let mut config = config();
        config.mark_instantiated(Utc::now());
        config.sync_instantiated(false, Utc::now());

        assert!(!config.concept_is_new());
        assert!(!config.concept_is_instantiated());

        config.sync_instantiated(true, Utc::now());
        assert!(!config.concept_is_new());
        assert!(config.concept_is_instantiated());
    }
}
