//! Deep identity remapping of nested value entities.
//!
//! A merge never adopts a snapshot's nested entity identity: every nested
//! entity and each of its own nested children gets a freshly minted
//! `id`/`uuid`, while payload fields, declared order, and concept-origin
//! provenance are preserved verbatim.
//!
//! The rebuild is a pure function, independent of any store, so the identity
//! isolation property is unit-testable in isolation.

use uuid::Uuid;

use veld_core::EntityId;

use crate::snapshot::{
    Address, ContactPoint, Cost, Evidence, FinancialAdvantage, LegalResource, Procedure,
    Requirement, ServicePayload, Website,
};

/// Rebuilds a value with freshly minted identity.
///
/// Implementations mint a new `id`/`uuid` for the value and recurse into
/// nested children; all other fields are preserved.
pub trait Reidentify {
    /// Returns a copy of `self` with fresh identity throughout.
    #[must_use]
    fn reidentified(&self) -> Self;
}

impl Reidentify for Evidence {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Reidentify for Requirement {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            evidence: self.evidence.as_ref().map(Reidentify::reidentified),
            ..self.clone()
        }
    }
}

impl Reidentify for Website {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Reidentify for Procedure {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            websites: rebuild(&self.websites),
            ..self.clone()
        }
    }
}

impl Reidentify for Cost {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Reidentify for FinancialAdvantage {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Reidentify for Address {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Reidentify for ContactPoint {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            address: self.address.as_ref().map(Reidentify::reidentified),
            ..self.clone()
        }
    }
}

impl Reidentify for LegalResource {
    fn reidentified(&self) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Rebuilds a collection with fresh identity, preserving declared order.
#[must_use]
pub fn rebuild<T: Reidentify>(items: &[T]) -> Vec<T> {
    items.iter().map(Reidentify::reidentified).collect()
}

/// Rebuilds a full descriptive payload from a snapshot's payload.
///
/// Scalar fields are copied verbatim; every nested collection is rebuilt
/// with fresh identity.
#[must_use]
pub fn rebuild_payload(source: &ServicePayload) -> ServicePayload {
    ServicePayload {
        requirements: rebuild(&source.requirements),
        procedures: rebuild(&source.procedures),
        websites: rebuild(&source.websites),
        costs: rebuild(&source.costs),
        financial_advantages: rebuild(&source.financial_advantages),
        contact_points: rebuild(&source.contact_points),
        legal_resources: rebuild(&source.legal_resources),
        ..source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::LanguageMap;

    fn requirement_with_evidence() -> Requirement {
        let mut requirement = Requirement::new(
            3,
            LanguageMap::with("nl", "Inwoner zijn"),
            LanguageMap::with("nl", "U woont in de gemeente"),
        )
        .with_evidence(Evidence::new(
            LanguageMap::with("nl", "Identiteitskaart"),
            LanguageMap::new(),
        ));
        requirement.concept_origin = Some("https://concepts/req/42".to_string());
        requirement
    }

    #[test]
    fn reidentify_mints_fresh_identity() {
        let original = requirement_with_evidence();
        let rebuilt = original.reidentified();

        assert_ne!(rebuilt.id, original.id);
        assert_ne!(rebuilt.uuid, original.uuid);
    }

    #[test]
    fn reidentify_recurses_into_children() {
        let original = requirement_with_evidence();
        let rebuilt = original.reidentified();

        let original_evidence = original.evidence.unwrap();
        let rebuilt_evidence = rebuilt.evidence.unwrap();
        assert_ne!(rebuilt_evidence.id, original_evidence.id);
        assert_ne!(rebuilt_evidence.uuid, original_evidence.uuid);
        assert_eq!(rebuilt_evidence.title, original_evidence.title);
    }

    #[test]
    fn reidentify_preserves_payload_order_and_provenance() {
        let original = requirement_with_evidence();
        let rebuilt = original.reidentified();

        assert_eq!(rebuilt.order, 3);
        assert_eq!(rebuilt.title, original.title);
        assert_eq!(
            rebuilt.concept_origin.as_deref(),
            Some("https://concepts/req/42")
        );
    }

    #[test]
    fn rebuild_preserves_collection_order() {
        let items = vec![
            Cost::new(0, LanguageMap::with("nl", "Eerste"), LanguageMap::new()),
            Cost::new(1, LanguageMap::with("nl", "Tweede"), LanguageMap::new()),
        ];
        let rebuilt = rebuild(&items);

        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0].title, items[0].title);
        assert_eq!(rebuilt[1].title, items[1].title);
        assert_ne!(rebuilt[0].id, items[0].id);
        assert_ne!(rebuilt[1].id, items[1].id);
    }

    #[test]
    fn rebuild_payload_copies_scalars_verbatim() {
        let mut payload = ServicePayload::default();
        payload.title = LanguageMap::with("nl", "Parkeerkaart");
        payload.keywords = vec!["parkeren".to_string()];
        payload.requirements.push(requirement_with_evidence());

        let rebuilt = rebuild_payload(&payload);

        assert_eq!(rebuilt.title, payload.title);
        assert_eq!(rebuilt.keywords, payload.keywords);
        assert_ne!(rebuilt.requirements[0].id, payload.requirements[0].id);
    }

    #[test]
    fn procedure_websites_get_fresh_identity() {
        let mut procedure = Procedure::new(
            0,
            LanguageMap::with("nl", "Aanvragen"),
            LanguageMap::new(),
        );
        procedure.websites.push(Website::new(
            0,
            LanguageMap::with("nl", "Loket"),
            Some("https://loket.example".to_string()),
        ));

        let rebuilt = procedure.reidentified();
        assert_ne!(rebuilt.websites[0].id, procedure.websites[0].id);
        assert_eq!(rebuilt.websites[0].url, procedure.websites[0].url);
    }
}
