//! Error types for the merge pipeline.
//!
//! The pipeline distinguishes three failure classes:
//!
//! - [`MergeError::NotFound`]: a referenced snapshot, instance, or concept is
//!   absent. Non-retriable until upstream data changes.
//! - [`MergeError::Invariant`]: the resulting instance fails domain or
//!   publish validation. Non-retriable for that snapshot until upstream data
//!   changes.
//! - [`MergeError::System`]: data found in an unexpected partition,
//!   unmappable enumerations, or external registry failure. Retriable, since
//!   the cause may be transient.
//!
//! The batch runner treats all three identically: leave the snapshot
//! unprocessed and count the failure against the per-run retry budget. The
//! bounded budget is what prevents infinite loops on permanently-failing
//! snapshots; the next invocation picks them up again so operators can fix
//! upstream data and have it self-heal.

use thiserror::Error;

use crate::validator::Violation;

/// Result type alias for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that can occur during merge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A referenced snapshot, instance, or concept is absent.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The resulting instance violates a domain or publish invariant.
    #[error("invariant violation: {}", Violation::join(.violations))]
    Invariant {
        /// The violations reported by the validator.
        violations: Vec<Violation>,
    },

    /// Upstream data inconsistency or infrastructure failure.
    #[error("system error: {message}")]
    System {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MergeError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a system error with the given message.
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a system error with a source cause.
    #[must_use]
    pub fn system_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::System {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns a stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Invariant { .. } => "invariant",
            Self::System { .. } => "system",
        }
    }
}

impl From<veld_core::Error> for MergeError {
    fn from(err: veld_core::Error) -> Self {
        match err {
            veld_core::Error::ResourceNotFound { resource_type, id } => {
                Self::NotFound { resource_type, id }
            }
            veld_core::Error::NotFound(path) => Self::NotFound {
                resource_type: "object",
                id: path,
            },
            other => Self::system_with_source("core operation failed", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(MergeError::not_found("snapshot", "x").kind(), "not_found");
        assert_eq!(MergeError::system("boom").kind(), "system");
        assert_eq!(
            MergeError::Invariant { violations: vec![] }.kind(),
            "invariant"
        );
    }

    #[test]
    fn core_not_found_maps_to_not_found() {
        let core = veld_core::Error::resource_not_found("instance", "abc");
        let merge: MergeError = core.into();
        assert_eq!(merge.kind(), "not_found");
    }

    #[test]
    fn core_storage_maps_to_system() {
        let core = veld_core::Error::storage("bucket unavailable");
        let merge: MergeError = core.into();
        assert_eq!(merge.kind(), "system");
    }
}
