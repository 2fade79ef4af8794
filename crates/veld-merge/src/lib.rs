//! # veld-merge
//!
//! Snapshot-merge pipeline for the veld record-management backend.
//!
//! This crate consumes an externally-produced, append-only stream of
//! versioned snapshots of public-service descriptions and materializes them
//! into a single mutable current-state instance per authority, under strict
//! ordering, idempotency, and partial-failure constraints.
//!
//! ## Architecture
//!
//! ```text
//! producer ──► SnapshotStore (append)
//!                   │
//!                   ▼
//!          MergeBatchRunner (poll unprocessed, bounded retry)
//!                   │
//!                   ▼
//!           SnapshotMerger (one snapshot at a time)
//!                   │
//!        ┌──────────┼───────────────┐
//!        ▼          ▼               ▼
//!  InstanceStore  DisplayConfig  AuthorityCodeList
//!        │
//!        ▼
//!   SnapshotStore (mark processed)
//! ```
//!
//! ## Consistency model
//!
//! - The processed set is an explicit idempotency-key set (snapshot IDs),
//!   never used to reconstruct instance state.
//! - `generated_at` is the authoritative total order; a merge of a snapshot
//!   older than an already-processed version of the same instance is a
//!   deliberate no-op that still reports success.
//! - No distributed transaction spans the stores; display-flag recomputation
//!   is a pure function of current instance state, so partial failures are
//!   self-healing on the next successful merge touching the same concept.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use veld_merge::{MergeBatchRunner, RunnerConfig, SnapshotMerger};
//!
//! let merger = Arc::new(SnapshotMerger::new(
//!     snapshots, instances, display, codelist, validator,
//! ));
//! let runner = MergeBatchRunner::new(directory, snapshots, merger, RunnerConfig::default());
//! let report = runner.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod codelist;
pub mod display;
pub mod error;
pub mod instance;
pub mod merger;
pub mod metrics;
pub mod remap;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod tombstone;
pub mod validator;

pub use display::DisplayConfiguration;
pub use error::{MergeError, Result};
pub use instance::{Instance, InstanceStatus, PublicationStatus, ReviewStatus};
pub use merger::{MergeOutcome, SnapshotMerger};
pub use runner::{MergeBatchRunner, MergeRunReport, RunnerConfig};
pub use snapshot::Snapshot;
pub use tombstone::{InstanceState, Tombstone, TombstoneLifecycle};
