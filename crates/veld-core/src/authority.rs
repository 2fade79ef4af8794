//! Multi-authority isolation primitives.
//!
//! Authority isolation is enforced at multiple levels in veld:
//! - **Storage layout**: Each authority's data lives under a unique prefix
//! - **Store contracts**: Every store operation is scoped to one authority
//! - **Merge pipeline**: A snapshot found outside its authority's partition is
//!   rejected as a data inconsistency, never silently merged
//!
//! # Example
//!
//! ```rust
//! use veld_core::authority::AuthorityId;
//!
//! let authority = AuthorityId::new("gemeente-aarschot").unwrap();
//! assert_eq!(authority.storage_prefix(), "authority=gemeente-aarschot/");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A unique identifier for an authority (the tenant/owner partition under
/// which instances and their configuration live).
///
/// Authority IDs must be:
/// - Non-empty
/// - Lowercase alphanumeric with hyphens
/// - Between 3 and 63 characters (compatible with DNS/bucket naming)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityId(String);

impl AuthorityId {
    /// Creates a new authority ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the authority ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_segment(&id, "authority ID")?;
        Ok(Self(id))
    }

    /// Creates an authority ID without validation.
    ///
    /// The caller must ensure the ID is valid. This is intended for use with
    /// IDs that have already been validated (e.g., read back from storage).
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the storage prefix for this authority.
    ///
    /// Returns `authority={id}/` - the key=value format keeps paths
    /// grep-friendly and self-documenting.
    #[must_use]
    pub fn storage_prefix(&self) -> String {
        format!("authority={}/", self.0)
    }

    /// Returns the authority ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AuthorityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unique identifier for an integrating-partner snapshot stream.
///
/// Each authority may receive snapshots over one or more partner streams;
/// the processed set is tracked per (authority, stream) partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new stream ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_segment(&id, "stream ID")?;
        Ok(Self(id))
    }

    /// Creates a stream ID without validation.
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validates an identifier segment against the shared naming rules.
fn validate_segment(id: &str, what: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidId {
            message: format!("{what} cannot be empty"),
        });
    }

    if id.len() < 3 {
        return Err(Error::InvalidId {
            message: format!("{what} '{id}' is too short (minimum 3 characters)"),
        });
    }

    if id.len() > 63 {
        return Err(Error::InvalidId {
            message: format!("{what} '{id}' is too long (maximum 63 characters)"),
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::InvalidId {
            message: format!(
                "{what} '{id}' contains invalid characters (only lowercase letters, digits, and hyphens allowed)"
            ),
        });
    }

    if id.starts_with('-') || id.ends_with('-') {
        return Err(Error::InvalidId {
            message: format!("{what} '{id}' cannot start or end with a hyphen"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_authority_ids() {
        assert!(AuthorityId::new("gemeente-aarschot").is_ok());
        assert!(AuthorityId::new("ocmw123").is_ok());
        assert!(AuthorityId::new("abc").is_ok());
    }

    #[test]
    fn invalid_authority_ids() {
        assert!(AuthorityId::new("").is_err());
        assert!(AuthorityId::new("ab").is_err());
        assert!(AuthorityId::new("UPPERCASE").is_err());
        assert!(AuthorityId::new("-starts-with-hyphen").is_err());
        assert!(AuthorityId::new("ends-with-hyphen-").is_err());
        assert!(AuthorityId::new("has spaces").is_err());
        assert!(AuthorityId::new("has_underscore").is_err());
    }

    #[test]
    fn storage_prefix() {
        let authority = AuthorityId::new("gemeente-aarschot").unwrap();
        assert_eq!(
            authority.storage_prefix(),
            "authority=gemeente-aarschot/"
        );
    }

    #[test]
    fn stream_ids_share_naming_rules() {
        assert!(StreamId::new("partner-feed").is_ok());
        assert!(StreamId::new("X").is_err());
    }
}
