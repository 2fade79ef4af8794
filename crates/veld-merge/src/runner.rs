//! Batch runner driving merges over all unprocessed snapshots.
//!
//! One `run()` enumerates every (authority, stream) partition, attempts each
//! unprocessed snapshot, marks successes in the processed set, and re-drives
//! failures in later rounds of the same run up to a bounded attempt budget.
//!
//! # Fairness
//!
//! Retries happen in rounds over the still-failing set: every pending
//! snapshot is attempted once per round, so a poisoned snapshot costs one
//! attempt per round while the rest of the batch drains. One failing
//! snapshot can never block or starve the others.
//!
//! # Re-invocation
//!
//! The runner is invoked periodically by an external scheduler. A later
//! invocation skips snapshots already in the processed set and re-attempts
//! never-succeeded ones from scratch with a fresh budget, so upstream fixes
//! self-heal without operator intervention. Overlapping invocations are safe:
//! the merger's staleness check is the conflict resolver, and the processed
//! set is only ever appended to after success.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veld_core::{AuthorityId, InstanceId, SnapshotId, StreamId};

use crate::error::Result;
use crate::merger::{MergeOutcome, SnapshotMerger};
use crate::metrics::{record_merge_retry, record_run_duration};
use crate::store::{AuthorityDirectory, SnapshotStore};

/// Configuration for the batch runner.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Attempt budget per snapshot within one `run()` invocation.
    pub max_attempts: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

impl RunnerConfig {
    /// Overrides the per-snapshot attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// A snapshot that exhausted its attempt budget within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMerge {
    /// Authority whose partition holds the snapshot.
    pub authority: AuthorityId,
    /// The snapshot that failed.
    pub snapshot_id: SnapshotId,
    /// Attempts spent before giving up.
    pub attempts: u32,
    /// Error kind label of the last failure.
    pub kind: String,
    /// Rendered message of the last failure.
    pub error: String,
}

/// Report from one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed.
    pub completed_at: DateTime<Utc>,
    /// Unprocessed snapshots found across all partitions.
    pub snapshots_seen: usize,
    /// Snapshots merged and marked processed (stale skips included).
    pub merged: usize,
    /// Stale snapshots among the merged ones.
    pub stale_skips: usize,
    /// Snapshots that exhausted the attempt budget.
    pub failed: Vec<FailedMerge>,
}

impl MergeRunReport {
    /// Returns true if any snapshot exhausted its budget.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// One unit of pending work.
struct PendingMerge {
    authority: AuthorityId,
    stream: StreamId,
    snapshot_id: SnapshotId,
    instance_id: InstanceId,
    generated_at: DateTime<Utc>,
    attempts: u32,
    last_error: Option<(String, String)>,
}

/// Drives merges over all unprocessed snapshots with bounded retry.
#[derive(Clone)]
pub struct MergeBatchRunner {
    directory: Arc<dyn AuthorityDirectory>,
    snapshots: Arc<dyn SnapshotStore>,
    merger: SnapshotMerger,
    config: RunnerConfig,
}

impl std::fmt::Debug for MergeBatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeBatchRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MergeBatchRunner {
    /// Creates a runner over the given collaborators.
    #[must_use]
    pub fn new(
        directory: Arc<dyn AuthorityDirectory>,
        snapshots: Arc<dyn SnapshotStore>,
        merger: SnapshotMerger,
        config: RunnerConfig,
    ) -> Self {
        Self {
            directory,
            snapshots,
            merger,
            config,
        }
    }

    /// Runs one batch over every partition.
    ///
    /// # Errors
    ///
    /// Returns an error only if partition enumeration fails; individual merge
    /// failures are recorded in the report, not propagated.
    pub async fn run(&self) -> Result<MergeRunReport> {
        let started = Instant::now();
        let started_at = Utc::now();

        let mut pending = self.collect_pending().await?;
        let snapshots_seen = pending.len();

        tracing::info!(
            snapshots = snapshots_seen,
            max_attempts = self.config.max_attempts,
            "Starting merge batch run"
        );

        let mut merged = 0usize;
        let mut stale_skips = 0usize;
        let mut failed: Vec<FailedMerge> = Vec::new();

        while !pending.is_empty() {
            let mut still_failing = Vec::new();

            for mut item in pending {
                if item.attempts > 0 {
                    record_merge_retry(item.authority.as_str());
                }

                match self.attempt(&item).await {
                    Ok(outcome) => {
                        merged += 1;
                        if outcome == MergeOutcome::SkippedStale {
                            stale_skips += 1;
                        }
                    }
                    Err((kind, error)) => {
                        item.attempts += 1;
                        item.last_error = Some((kind, error));
                        if item.attempts >= self.config.max_attempts {
                            failed.push(item.into_failed());
                        } else {
                            still_failing.push(item);
                        }
                    }
                }
            }

            pending = still_failing;
        }

        for failure in &failed {
            tracing::error!(
                authority = %failure.authority,
                snapshot = %failure.snapshot_id,
                attempts = failure.attempts,
                kind = %failure.kind,
                error = %failure.error,
                "Snapshot exhausted its attempt budget"
            );
        }

        let duration = started.elapsed().as_secs_f64();
        record_run_duration(duration);
        tracing::info!(
            snapshots = snapshots_seen,
            merged,
            stale_skips,
            failed = failed.len(),
            duration_secs = duration,
            "Merge batch run complete"
        );

        Ok(MergeRunReport {
            started_at,
            completed_at: Utc::now(),
            snapshots_seen,
            merged,
            stale_skips,
            failed,
        })
    }

    /// Enumerates unprocessed snapshots across all partitions, ordered so
    /// that versions of one identity are attempted oldest-first.
    async fn collect_pending(&self) -> Result<Vec<PendingMerge>> {
        let mut pending = Vec::new();

        for authority in self.directory.authorities().await? {
            for stream in self.snapshots.streams(&authority).await? {
                let unprocessed = self.snapshots.list_unprocessed(&authority, &stream).await?;
                for snapshot in unprocessed {
                    pending.push(PendingMerge {
                        authority: authority.clone(),
                        stream: stream.clone(),
                        snapshot_id: snapshot.id,
                        instance_id: snapshot.is_version_of,
                        generated_at: snapshot.generated_at,
                        attempts: 0,
                        last_error: None,
                    });
                }
            }
        }

        // Oldest-first within one identity; the staleness check makes any
        // other arrival order safe, this just avoids needless overwrites.
        pending.sort_by(|a, b| {
            (&a.authority, a.instance_id, a.generated_at, a.snapshot_id).cmp(&(
                &b.authority,
                b.instance_id,
                b.generated_at,
                b.snapshot_id,
            ))
        });

        Ok(pending)
    }

    /// One merge attempt plus processed-set bookkeeping.
    async fn attempt(&self, item: &PendingMerge) -> std::result::Result<MergeOutcome, (String, String)> {
        let outcome = self
            .merger
            .merge(&item.authority, item.snapshot_id)
            .await
            .map_err(|e| (e.kind().to_string(), e.to_string()))?;

        // Marking after success keeps the set an exactly-once record; if the
        // mark itself fails the snapshot is retried and the merge is a no-op
        // the second time.
        self.snapshots
            .mark_processed(&item.authority, &item.stream, item.snapshot_id)
            .await
            .map_err(|e| (e.kind().to_string(), e.to_string()))?;

        Ok(outcome)
    }
}

impl PendingMerge {
    fn into_failed(self) -> FailedMerge {
        let (kind, error) = self
            .last_error
            .unwrap_or_else(|| ("system".to_string(), "unknown failure".to_string()));
        FailedMerge {
            authority: self.authority,
            snapshot_id: self.snapshot_id,
            attempts: self.attempts,
            kind,
            error,
        }
    }
}
