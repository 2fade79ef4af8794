//! Merge pipeline metrics.
//!
//! Provides metrics for merge outcomes, retry pressure, and code-list
//! fetches. These metrics complement the structured logging already in place.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Merge Metrics
// ============================================================================

/// Successful merges counter.
pub const MERGE_SUCCESS: &str = "veld_merge_success_total";

/// Failed merges counter.
pub const MERGE_FAILURE: &str = "veld_merge_failure_total";

/// Stale-skip counter (deliberate no-op merges).
pub const MERGE_STALE_SKIP: &str = "veld_merge_stale_skip_total";

/// Retry attempts counter (attempts after the first, within one run).
pub const MERGE_RETRY: &str = "veld_merge_retry_total";

/// Batch run duration histogram.
pub const MERGE_RUN_DURATION: &str = "veld_merge_run_duration_seconds";

// ============================================================================
// Code-List Metrics
// ============================================================================

/// Registry fetch counter.
pub const CODELIST_FETCH: &str = "veld_codelist_fetch_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all merge pipeline metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(MERGE_SUCCESS, "Total snapshots merged successfully");
    describe_counter!(MERGE_FAILURE, "Total merge failures");
    describe_counter!(MERGE_STALE_SKIP, "Total stale snapshots skipped");
    describe_counter!(MERGE_RETRY, "Total merge retry attempts within a run");
    describe_histogram!(MERGE_RUN_DURATION, "Duration of batch runs in seconds");
    describe_counter!(CODELIST_FETCH, "Total authority registry fetches");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records a successful merge.
pub fn record_merge_success(authority: &str) {
    counter!(MERGE_SUCCESS, "authority" => authority.to_string()).increment(1);
}

/// Records a failed merge with its error kind.
pub fn record_merge_failure(authority: &str, kind: &'static str) {
    counter!(
        MERGE_FAILURE,
        "authority" => authority.to_string(),
        "kind" => kind,
    )
    .increment(1);
}

/// Records a stale snapshot skipped as a deliberate no-op.
pub fn record_stale_skip(authority: &str) {
    counter!(MERGE_STALE_SKIP, "authority" => authority.to_string()).increment(1);
}

/// Records a retry attempt.
pub fn record_merge_retry(authority: &str) {
    counter!(MERGE_RETRY, "authority" => authority.to_string()).increment(1);
}

/// Records batch run completion.
pub fn record_run_duration(duration_secs: f64) {
    histogram!(MERGE_RUN_DURATION).record(duration_secs);
}

/// Records a registry fetch with its outcome.
pub fn record_codelist_fetch(outcome: &'static str) {
    counter!(CODELIST_FETCH, "outcome" => outcome).increment(1);
}
