//! # veld-core
//!
//! Core abstractions for the veld record-management backend.
//!
//! This crate provides the foundational types used across all veld components:
//!
//! - **Authority Context**: Multi-authority isolation primitives
//! - **Identifiers**: Strongly-typed IDs for snapshots, instances, and concepts
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `veld-core` is the **only** crate allowed to define shared primitives.
//! Domain logic (snapshot merging, tombstone lifecycle, batch running) lives
//! in `veld-merge` and consumes the contracts defined here.
//!
//! ## Example
//!
//! ```rust
//! use veld_core::prelude::*;
//!
//! // Create an authority context
//! let authority = AuthorityId::new("gemeente-aarschot");
//!
//! // Generate a unique entity ID
//! let entity_id = EntityId::generate();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod authority;
pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use veld_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::authority::{AuthorityId, StreamId};
    pub use crate::error::{Error, Result};
    pub use crate::id::{ConceptId, EntityId, InstanceId, SnapshotId};
}

pub use authority::{AuthorityId, StreamId};
pub use error::{Error, Result};
pub use id::{ConceptId, EntityId, InstanceId, SnapshotId};
