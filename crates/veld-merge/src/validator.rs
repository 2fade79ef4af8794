//! Publish-readiness validation for materialized instances.
//!
//! A merge runs the validator against the fully materialized instance before
//! anything is persisted; a violation aborts the merge and leaves the
//! snapshot unprocessed. How descriptive text is authored and which language
//! variants exist is out of scope; the validator only enforces structural
//! publish invariants over what it is handed.

use serde::{Deserialize, Serialize};

use crate::instance::Instance;
use crate::snapshot::LanguageMap;

/// A single publish-invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// The field that violates the invariant.
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Joins violations into a single log-friendly line.
    #[must_use]
    pub fn join(violations: &[Self]) -> String {
        if violations.is_empty() {
            return "no violations recorded".to_string();
        }
        violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Enforces publish-readiness invariants on a materialized instance.
pub trait InstanceValidator: Send + Sync {
    /// Returns every violation found; empty means publish-ready.
    fn validate_for_publish(&self, instance: &Instance) -> Vec<Violation>;
}

/// Default publish validator.
///
/// Enforces:
/// - a non-empty title and description
/// - identical language sets across title and description
/// - optional text fields, when present, restricted to the title's languages
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishValidator;

impl PublishValidator {
    /// Creates a new publish validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn check_language_subset(
        violations: &mut Vec<Violation>,
        field: &str,
        value: &LanguageMap,
        reference: &LanguageMap,
    ) {
        if value.is_empty() {
            return;
        }
        if !value.languages().is_subset(&reference.languages()) {
            violations.push(Violation::new(
                field,
                "carries language variants absent from the title",
            ));
        }
    }
}

impl InstanceValidator for PublishValidator {
    fn validate_for_publish(&self, instance: &Instance) -> Vec<Violation> {
        let mut violations = Vec::new();
        let payload = &instance.payload;

        if payload.title.is_empty() {
            violations.push(Violation::new("title", "title is required for publication"));
        }

        if payload.description.is_empty() {
            violations.push(Violation::new(
                "description",
                "description is required for publication",
            ));
        }

        if !payload.title.is_empty()
            && !payload.description.is_empty()
            && !payload.title.same_languages(&payload.description)
        {
            violations.push(Violation::new(
                "description",
                "language set differs from the title's",
            ));
        }

        Self::check_language_subset(
            &mut violations,
            "additionalDescription",
            &payload.additional_description,
            &payload.title,
        );
        Self::check_language_subset(
            &mut violations,
            "exception",
            &payload.exception,
            &payload.title,
        );

        violations
    }
}
