//! Snapshot data model for the merge pipeline.
//!
//! A snapshot is an immutable, externally-produced description of one
//! public-service instance at one point in time. Snapshots arrive over
//! integrating-partner streams and are append-only; the pipeline never
//! mutates them.
//!
//! # Identity
//!
//! Each snapshot carries its own emission ID plus the stable identity of the
//! instance it is a version of (`is_version_of`). Nested value entities
//! inside a snapshot carry `id`/`uuid` pairs that are meaningful only within
//! that snapshot: a merge rebuilds every nested collection with freshly
//! minted identity (see [`crate::remap`]).
//!
//! # Ordering
//!
//! `generated_at` is the authoritative total order over versions of one
//! instance. Snapshot IDs are used purely for exactly-once bookkeeping, never
//! for ordering decisions (ULID mint times are subject to producer clock
//! skew).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veld_core::{AuthorityId, ConceptId, EntityId, InstanceId, SnapshotId};

/// Error returned when a wire string does not map to a known enum variant.
///
/// Enumeration mapping is exhaustive: an unrecognized value is an explicit
/// error, never a silent fallback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} variant: '{value}'")]
pub struct UnknownVariant {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The unrecognized wire value.
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// A language-tagged text value.
///
/// Keys are BCP 47 language tags (e.g. `nl`, `nl-be-x-formal`). How language
/// variants are produced is out of scope for the pipeline; it only carries
/// them and compares language sets during publish validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageMap(BTreeMap<String, String>);

impl LanguageMap {
    /// Creates an empty language map.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a map with a single language entry.
    #[must_use]
    pub fn with(lang: impl Into<String>, text: impl Into<String>) -> Self {
        let mut map = Self::new();
        map.set(lang, text);
        map
    }

    /// Sets the text for a language, replacing any previous value.
    pub fn set(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        self.0.insert(lang.into(), text.into());
    }

    /// Returns the text for a language, if present.
    #[must_use]
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0.get(lang).map(String::as_str)
    }

    /// Returns the set of language tags present.
    #[must_use]
    pub fn languages(&self) -> BTreeSet<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Returns true if no language entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if both maps carry exactly the same language tags.
    #[must_use]
    pub fn same_languages(&self, other: &Self) -> bool {
        self.languages() == other.languages()
    }
}

/// The kind of product or service being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductType {
    /// A permit or authorization.
    Permit,
    /// A financial benefit (premium, subsidy).
    FinancialBenefit,
    /// A proof or attestation document.
    Proof,
    /// Advice and guidance services.
    AdviceGuidance,
    /// Infrastructure and material provision.
    InfrastructureMaterial,
    /// A financial obligation.
    FinancialObligation,
}

impl ProductType {
    /// Returns the wire representation of this product type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Permit => "permit",
            Self::FinancialBenefit => "financialBenefit",
            Self::Proof => "proof",
            Self::AdviceGuidance => "adviceGuidance",
            Self::InfrastructureMaterial => "infrastructureMaterial",
            Self::FinancialObligation => "financialObligation",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permit" => Ok(Self::Permit),
            "financialBenefit" => Ok(Self::FinancialBenefit),
            "proof" => Ok(Self::Proof),
            "adviceGuidance" => Ok(Self::AdviceGuidance),
            "infrastructureMaterial" => Ok(Self::InfrastructureMaterial),
            "financialObligation" => Ok(Self::FinancialObligation),
            other => Err(UnknownVariant::new("product type", other)),
        }
    }
}

/// Government level of a competent or executing authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorityLevel {
    /// European level.
    European,
    /// Federal level.
    Federal,
    /// Regional level.
    Regional,
    /// Provincial level.
    Provincial,
    /// Local (municipal) level.
    Local,
}

impl AuthorityLevel {
    /// Returns the wire representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::European => "european",
            Self::Federal => "federal",
            Self::Regional => "regional",
            Self::Provincial => "provincial",
            Self::Local => "local",
        }
    }
}

impl FromStr for AuthorityLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "european" => Ok(Self::European),
            "federal" => Ok(Self::Federal),
            "regional" => Ok(Self::Regional),
            "provincial" => Ok(Self::Provincial),
            "local" => Ok(Self::Local),
            other => Err(UnknownVariant::new("authority level", other)),
        }
    }
}

// ============================================================================
// Nested value entities
// ============================================================================

/// Supporting evidence required for a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Title of the evidence.
    pub title: LanguageMap,
    /// Description of the evidence.
    pub description: LanguageMap,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl Evidence {
    /// Creates evidence with freshly minted identity.
    #[must_use]
    pub fn new(title: LanguageMap, description: LanguageMap) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            title,
            description,
            concept_origin: None,
        }
    }
}

/// A condition the citizen must satisfy to obtain the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the requirement.
    pub title: LanguageMap,
    /// Description of the requirement.
    pub description: LanguageMap,
    /// Evidence the citizen must supply, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl Requirement {
    /// Creates a requirement with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, title: LanguageMap, description: LanguageMap) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title,
            description,
            evidence: None,
            concept_origin: None,
        }
    }

    /// Attaches evidence to the requirement.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// A website reference, either standalone or nested under a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Website {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the website.
    pub title: LanguageMap,
    /// Description of the website.
    pub description: LanguageMap,
    /// The URL itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl Website {
    /// Creates a website with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, title: LanguageMap, url: Option<String>) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title,
            description: LanguageMap::new(),
            url,
            concept_origin: None,
        }
    }
}

/// A step-by-step procedure for obtaining the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the procedure.
    pub title: LanguageMap,
    /// Description of the procedure.
    pub description: LanguageMap,
    /// Websites supporting this procedure.
    pub websites: Vec<Website>,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl Procedure {
    /// Creates a procedure with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, title: LanguageMap, description: LanguageMap) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title,
            description,
            websites: Vec::new(),
            concept_origin: None,
        }
    }
}

/// A cost the citizen incurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the cost.
    pub title: LanguageMap,
    /// Description of the cost.
    pub description: LanguageMap,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl Cost {
    /// Creates a cost with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, title: LanguageMap, description: LanguageMap) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title,
            description,
            concept_origin: None,
        }
    }
}

/// A financial advantage attached to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialAdvantage {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the advantage.
    pub title: LanguageMap,
    /// Description of the advantage.
    pub description: LanguageMap,
    /// Opaque reference to the concept entity this originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_origin: Option<String>,
}

impl FinancialAdvantage {
    /// Creates a financial advantage with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, title: LanguageMap, description: LanguageMap) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title,
            description,
            concept_origin: None,
        }
    }
}

/// A physical address nested under a contact point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Street name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    /// House number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    /// Box number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_number: Option<String>,
    /// Postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    /// Municipality name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    /// Country name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    /// Creates an empty address with freshly minted identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            street: None,
            house_number: None,
            box_number: None,
            zip_code: None,
            municipality: None,
            country: None,
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new()
    }
}

/// A contact point for the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPoint {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Contact email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact telephone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    /// Contact website URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    /// Free-form opening hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    /// Physical address, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl ContactPoint {
    /// Creates a contact point with freshly minted identity.
    #[must_use]
    pub fn new(order: u32) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            email: None,
            telephone: None,
            website_url: None,
            opening_hours: None,
            address: None,
        }
    }
}

/// A reference to legislation governing the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalResource {
    /// Identity within the owning document.
    pub id: EntityId,
    /// Stable UUID within the owning document.
    pub uuid: Uuid,
    /// Position in the declared collection order.
    pub order: u32,
    /// Title of the legal resource.
    pub title: LanguageMap,
    /// Description of the legal resource.
    pub description: LanguageMap,
    /// URL of the legal text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl LegalResource {
    /// Creates a legal resource with freshly minted identity.
    #[must_use]
    pub fn new(order: u32, url: Option<String>) -> Self {
        Self {
            id: EntityId::generate(),
            uuid: Uuid::new_v4(),
            order,
            title: LanguageMap::new(),
            description: LanguageMap::new(),
            url,
        }
    }
}

// ============================================================================
// Descriptive payload
// ============================================================================

/// The full descriptive payload shared by snapshots and instances.
///
/// Scalar fields are copied verbatim on merge; nested collections are rebuilt
/// with fresh identity (see [`crate::remap`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePayload {
    /// Service title, per language.
    pub title: LanguageMap,
    /// Service description, per language.
    pub description: LanguageMap,
    /// Additional free-form description.
    #[serde(skip_serializing_if = "LanguageMap::is_empty", default)]
    pub additional_description: LanguageMap,
    /// Exceptions to the service.
    #[serde(skip_serializing_if = "LanguageMap::is_empty", default)]
    pub exception: LanguageMap,
    /// Start of the service's validity window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// End of the service's validity window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Product type of the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,
    /// Government levels of the competent authorities.
    pub competent_authority_levels: BTreeSet<AuthorityLevel>,
    /// IRIs of the competent authorities.
    pub competent_authorities: BTreeSet<String>,
    /// Government levels of the executing authorities.
    pub executing_authority_levels: BTreeSet<AuthorityLevel>,
    /// IRIs of the executing authorities.
    pub executing_authorities: BTreeSet<String>,
    /// Free-form keywords.
    pub keywords: Vec<String>,
    /// Conditions the citizen must satisfy.
    pub requirements: Vec<Requirement>,
    /// Step-by-step procedures.
    pub procedures: Vec<Procedure>,
    /// Standalone website references.
    pub websites: Vec<Website>,
    /// Costs incurred by the citizen.
    pub costs: Vec<Cost>,
    /// Financial advantages attached to the service.
    pub financial_advantages: Vec<FinancialAdvantage>,
    /// Contact points.
    pub contact_points: Vec<ContactPoint>,
    /// Governing legislation references.
    pub legal_resources: Vec<LegalResource>,
}

impl ServicePayload {
    /// Returns every authority IRI referenced by competent or executing
    /// authority fields.
    pub fn referenced_authority_iris(&self) -> impl Iterator<Item = &str> {
        self.competent_authorities
            .iter()
            .chain(self.executing_authorities.iter())
            .map(String::as_str)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// An immutable, versioned, externally-produced description of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique ID of this emission.
    pub id: SnapshotId,
    /// Stable identity of the instance this snapshot is a version of.
    pub is_version_of: InstanceId,
    /// Version timestamp; the authoritative total order key.
    pub generated_at: DateTime<Utc>,
    /// True if this snapshot archives (deletes) the instance.
    pub is_archived: bool,
    /// Authority that owns the described instance.
    pub created_by: AuthorityId,
    /// Concept template the instance is linked to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<ConceptId>,
    /// The full descriptive payload.
    #[serde(flatten)]
    pub payload: ServicePayload,
}

impl Snapshot {
    /// Creates a non-archiving snapshot with an empty payload.
    #[must_use]
    pub fn new(
        is_version_of: InstanceId,
        generated_at: DateTime<Utc>,
        created_by: AuthorityId,
    ) -> Self {
        Self {
            id: SnapshotId::generate(),
            is_version_of,
            generated_at,
            is_archived: false,
            created_by,
            concept_id: None,
            payload: ServicePayload::default(),
        }
    }

    /// Marks the snapshot as archiving.
    #[must_use]
    pub fn archived(mut self) -> Self {
        self.is_archived = true;
        self
    }

    /// Sets the concept link.
    #[must_use]
    pub fn with_concept(mut self, concept_id: ConceptId) -> Self {
        self.concept_id = Some(concept_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_map_tracks_language_sets() {
        let mut title = LanguageMap::with("nl", "Parkeerkaart");
        title.set("en", "Parking permit");

        let description = LanguageMap::with("nl", "Beschrijving");

        assert_eq!(title.languages().len(), 2);
        assert!(!title.same_languages(&description));
        assert!(description.same_languages(&LanguageMap::with("nl", "Anders")));
    }

    #[test]
    fn product_type_parses_exhaustively() {
        for s in [
            "permit",
            "financialBenefit",
            "proof",
            "adviceGuidance",
            "infrastructureMaterial",
            "financialObligation",
        ] {
            let parsed: ProductType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn unknown_product_type_is_an_error() {
        let err = "somethingNew".parse::<ProductType>().unwrap_err();
        assert!(err.to_string().contains("somethingNew"));
    }

    #[test]
    fn unknown_authority_level_is_an_error() {
        assert!("galactic".parse::<AuthorityLevel>().is_err());
    }

    #[test]
    fn referenced_iris_cover_both_authority_sets() {
        let mut payload = ServicePayload::default();
        payload
            .competent_authorities
            .insert("https://registry/aarschot".to_string());
        payload
            .executing_authorities
            .insert("https://registry/leuven".to_string());

        let iris: Vec<&str> = payload.referenced_authority_iris().collect();
        assert_eq!(iris.len(), 2);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let mut snapshot = Snapshot::new(
            InstanceId::generate(),
            Utc::now(),
            AuthorityId::new("gemeente-aarschot").unwrap(),
        );
        snapshot.payload.title = LanguageMap::with("nl", "Parkeerkaart");
        snapshot.payload.requirements.push(Requirement::new(
            0,
            LanguageMap::with("nl", "Inwoner zijn"),
            LanguageMap::with("nl", "U woont in de gemeente"),
        ));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
