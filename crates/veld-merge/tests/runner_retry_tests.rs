//! Batch runner behavior: bounded retry, fairness, and re-invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, Utc};

use veld_core::{AuthorityId, InstanceId, StreamId};
use veld_merge::codelist::{CachingCodeList, StaticRegistry};
use veld_merge::instance::Instance;
use veld_merge::snapshot::{LanguageMap, Snapshot};
use veld_merge::store::memory::{
    MemoryAuthorityDirectory, MemoryDisplayConfigurationStore, MemoryInstanceStore,
    MemorySnapshotStore,
};
use veld_merge::store::{DisplayConfigurationStore, InstanceStore, SnapshotStore};
use veld_merge::validator::{InstanceValidator, PublishValidator, Violation};
use veld_merge::{MergeBatchRunner, RunnerConfig, SnapshotMerger};

fn authority() -> AuthorityId {
    AuthorityId::new("gemeente-aarschot").unwrap()
}

fn stream() -> StreamId {
    StreamId::new("partner-feed").unwrap()
}

/// Counts validation calls on top of the real publish rules.
struct CountingValidator {
    inner: PublishValidator,
    calls: Arc<AtomicUsize>,
}

impl InstanceValidator for CountingValidator {
    fn validate_for_publish(&self, instance: &Instance) -> Vec<Violation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.validate_for_publish(instance)
    }
}

struct Harness {
    snapshots: Arc<MemorySnapshotStore>,
    instances: Arc<MemoryInstanceStore>,
    runner: MergeBatchRunner,
    validations: Arc<AtomicUsize>,
}

impl Harness {
    fn new(authorities: Vec<AuthorityId>, config: RunnerConfig) -> Self {
        let directory = Arc::new(MemoryAuthorityDirectory::new(authorities));
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let instances = Arc::new(MemoryInstanceStore::new());
        let display = Arc::new(MemoryDisplayConfigurationStore::new(
            Arc::clone(&directory) as Arc<dyn veld_merge::store::AuthorityDirectory>
        ));
        let validations = Arc::new(AtomicUsize::new(0));
        let merger = SnapshotMerger::new(
            Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
            Arc::clone(&instances) as Arc<dyn InstanceStore>,
            Arc::clone(&display) as Arc<dyn DisplayConfigurationStore>,
            Arc::new(CachingCodeList::new(StaticRegistry)),
            Arc::new(CountingValidator {
                inner: PublishValidator::new(),
                calls: Arc::clone(&validations),
            }),
        );
        let runner = MergeBatchRunner::new(directory, Arc::clone(&snapshots) as Arc<dyn SnapshotStore>, merger, config);
        Self {
            snapshots,
            instances,
            runner,
            validations,
        }
    }
}

fn valid_snapshot(authority: &AuthorityId, instance_id: InstanceId, title: &str) -> Snapshot {
    let mut snapshot = Snapshot::new(instance_id, Utc::now(), authority.clone());
    snapshot.payload.title = LanguageMap::with("nl", title);
    snapshot.payload.description = LanguageMap::with("nl", "Beschrijving van het product");
    snapshot
}

/// A snapshot that deterministically fails publish validation.
fn poisoned_snapshot(authority: &AuthorityId, instance_id: InstanceId) -> Snapshot {
    let mut snapshot = valid_snapshot(authority, instance_id, "Kapotte titel");
    snapshot.payload.description = LanguageMap::with("en", "Language sets do not match");
    snapshot
}

#[tokio::test]
async fn poisoned_snapshot_exhausts_its_budget_without_starving_others() {
    let h = Harness::new(vec![authority()], RunnerConfig::default().with_max_attempts(3));
    let healthy_instance = InstanceId::generate();

    h.snapshots
        .append(&authority(), &stream(), poisoned_snapshot(&authority(), InstanceId::generate()))
        .unwrap();
    h.snapshots
        .append(
            &authority(),
            &stream(),
            valid_snapshot(&authority(), healthy_instance, "Gezonde titel"),
        )
        .unwrap();

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.snapshots_seen, 2);
    assert_eq!(report.merged, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].attempts, 3);
    assert_eq!(report.failed[0].kind, "invariant");

    // The healthy snapshot was validated once; the poisoned one per attempt.
    assert_eq!(h.validations.load(Ordering::SeqCst), 4);
    assert!(h.instances.exists(&authority(), healthy_instance).await.unwrap());
}

#[tokio::test]
async fn reinvocation_skips_processed_and_retries_failed_from_scratch() {
    let h = Harness::new(vec![authority()], RunnerConfig::default().with_max_attempts(2));

    h.snapshots
        .append(&authority(), &stream(), poisoned_snapshot(&authority(), InstanceId::generate()))
        .unwrap();
    h.snapshots
        .append(
            &authority(),
            &stream(),
            valid_snapshot(&authority(), InstanceId::generate(), "Gezonde titel"),
        )
        .unwrap();

    let first = h.runner.run().await.unwrap();
    assert_eq!(first.merged, 1);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(h.snapshots.processed_count().unwrap(), 1);

    // Second invocation only sees the never-succeeded snapshot and spends a
    // fresh budget on it.
    let second = h.runner.run().await.unwrap();
    assert_eq!(second.snapshots_seen, 1);
    assert_eq!(second.merged, 0);
    assert_eq!(second.failed.len(), 1);
    assert_eq!(second.failed[0].attempts, 2);
    assert_eq!(h.snapshots.processed_count().unwrap(), 1);
}

#[tokio::test]
async fn run_covers_all_authorities_and_streams() {
    let aarschot = authority();
    let leuven = AuthorityId::new("stad-leuven").unwrap();
    let h = Harness::new(vec![aarschot.clone(), leuven.clone()], RunnerConfig::default());

    let a_instance = InstanceId::generate();
    let b_instance = InstanceId::generate();
    h.snapshots
        .append(&aarschot, &stream(), valid_snapshot(&aarschot, a_instance, "Titel A"))
        .unwrap();
    h.snapshots
        .append(
            &leuven,
            &StreamId::new("other-feed").unwrap(),
            valid_snapshot(&leuven, b_instance, "Titel B"),
        )
        .unwrap();

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.snapshots_seen, 2);
    assert_eq!(report.merged, 2);
    assert!(!report.has_failures());
    assert!(h.instances.exists(&aarschot, a_instance).await.unwrap());
    assert!(h.instances.exists(&leuven, b_instance).await.unwrap());
}

#[tokio::test]
async fn run_converges_out_of_order_versions_to_the_newest() {
    let h = Harness::new(vec![authority()], RunnerConfig::default());
    let instance_id = InstanceId::generate();
    let base = Utc::now();

    // Appended newest-first; the runner orders attempts oldest-first and the
    // staleness check covers whatever order remains.
    for (minutes, title) in [(2, "Titel op t3"), (0, "Titel op t1"), (1, "Titel op t2")] {
        let mut snapshot = valid_snapshot(&authority(), instance_id, title);
        snapshot.generated_at = base + Duration::minutes(minutes);
        h.snapshots.append(&authority(), &stream(), snapshot).unwrap();
    }

    let report = h.runner.run().await.unwrap();
    assert_eq!(report.merged, 3);

    let instance = h
        .instances
        .find(&authority(), instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.payload.title.get("nl"), Some("Titel op t3"));
}

#[tokio::test]
async fn empty_partitions_produce_an_empty_report() {
    let h = Harness::new(vec![authority()], RunnerConfig::default());
    let report = h.runner.run().await.unwrap();

    assert_eq!(report.snapshots_seen, 0);
    assert_eq!(report.merged, 0);
    assert!(!report.has_failures());
}
