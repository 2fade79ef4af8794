//! In-memory store implementations for testing and development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no durability, no cross-process
//!   coordination
//! - **Single-process only**: state is not shared across process boundaries

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use veld_core::{AuthorityId, ConceptId, InstanceId, SnapshotId, StreamId};

use crate::display::DisplayConfiguration;
use crate::error::{MergeError, Result};
use crate::instance::Instance;
use crate::snapshot::Snapshot;
use crate::store::{
    AuthorityDirectory, DisplayConfigurationStore, InstanceStore, SnapshotStore,
};
use crate::tombstone::{InstanceState, Tombstone};

/// Converts a lock poison error to a system error.
fn poison_err<T>(_: PoisonError<T>) -> MergeError {
    MergeError::system("lock poisoned")
}

/// Fixed-membership authority directory.
#[derive(Debug, Default)]
pub struct MemoryAuthorityDirectory {
    authorities: Vec<AuthorityId>,
}

impl MemoryAuthorityDirectory {
    /// Creates a directory over the given authorities.
    #[must_use]
    pub fn new(authorities: Vec<AuthorityId>) -> Self {
        Self { authorities }
    }
}

#[async_trait]
impl AuthorityDirectory for MemoryAuthorityDirectory {
    async fn authorities(&self) -> Result<Vec<AuthorityId>> {
        Ok(self.authorities.clone())
    }
}

/// One (authority, stream) partition of the snapshot store.
#[derive(Debug, Default)]
struct Partition {
    snapshots: BTreeMap<SnapshotId, Snapshot>,
    processed: BTreeSet<SnapshotId>,
}

/// In-memory snapshot store.
///
/// Snapshots are appended per (authority, stream) partition; the processed
/// set lives alongside them.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    partitions: RwLock<HashMap<(AuthorityId, StreamId), Partition>>,
}

impl MemorySnapshotStore {
    /// Creates an empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot to a partition (the producer side).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn append(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
        snapshot: Snapshot,
    ) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        partitions
            .entry((authority.clone(), stream.clone()))
            .or_default()
            .snapshots
            .insert(snapshot.id, snapshot);
        Ok(())
    }

    /// Returns the number of processed snapshots across all partitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn processed_count(&self) -> Result<usize> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions.values().map(|p| p.processed.len()).sum())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, authority: &AuthorityId, snapshot_id: SnapshotId) -> Result<Snapshot> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        partitions
            .iter()
            .filter(|((a, _), _)| a == authority)
            .find_map(|(_, partition)| partition.snapshots.get(&snapshot_id))
            .cloned()
            .ok_or_else(|| MergeError::not_found("snapshot", snapshot_id))
    }

    async fn streams(&self, authority: &AuthorityId) -> Result<Vec<StreamId>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        let mut streams: Vec<StreamId> = partitions
            .keys()
            .filter(|(a, _)| a == authority)
            .map(|(_, s)| s.clone())
            .collect();
        streams.sort();
        Ok(streams)
    }

    async fn list_unprocessed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
    ) -> Result<Vec<Snapshot>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        let Some(partition) = partitions.get(&(authority.clone(), stream.clone())) else {
            return Ok(Vec::new());
        };
        Ok(partition
            .snapshots
            .values()
            .filter(|s| !partition.processed.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn mark_processed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
        snapshot_id: SnapshotId,
    ) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        partitions
            .entry((authority.clone(), stream.clone()))
            .or_default()
            .processed
            .insert(snapshot_id);
        Ok(())
    }

    async fn is_processed(
        &self,
        authority: &AuthorityId,
        stream: &StreamId,
        snapshot_id: SnapshotId,
    ) -> Result<bool> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions
            .get(&(authority.clone(), stream.clone()))
            .is_some_and(|p| p.processed.contains(&snapshot_id)))
    }

    async fn latest_processed_generated_at(
        &self,
        authority: &AuthorityId,
        instance_id: InstanceId,
    ) -> Result<Option<DateTime<Utc>>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions
            .iter()
            .filter(|((a, _), _)| a == authority)
            .flat_map(|(_, partition)| {
                partition
                    .snapshots
                    .values()
                    .filter(|s| {
                        s.is_version_of == instance_id && partition.processed.contains(&s.id)
                    })
                    .map(|s| s.generated_at)
            })
            .max())
    }
}

/// In-memory instance store.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    states: RwLock<HashMap<(AuthorityId, InstanceId), InstanceState>>,
}

impl MemoryInstanceStore {
    /// Creates an empty instance store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn find(&self, authority: &AuthorityId, id: InstanceId) -> Result<Option<Instance>> {
        let states = self.states.read().map_err(poison_err)?;
        Ok(states
            .get(&(authority.clone(), id))
            .and_then(InstanceState::as_instance)
            .cloned())
    }

    async fn exists(&self, authority: &AuthorityId, id: InstanceId) -> Result<bool> {
        let states = self.states.read().map_err(poison_err)?;
        Ok(states
            .get(&(authority.clone(), id))
            .is_some_and(InstanceState::is_active))
    }

    async fn state(
        &self,
        authority: &AuthorityId,
        id: InstanceId,
    ) -> Result<Option<InstanceState>> {
        let states = self.states.read().map_err(poison_err)?;
        Ok(states.get(&(authority.clone(), id)).cloned())
    }

    async fn save(&self, authority: &AuthorityId, instance: Instance) -> Result<()> {
        let mut states = self.states.write().map_err(poison_err)?;
        states.insert(
            (authority.clone(), instance.id),
            InstanceState::Active(instance),
        );
        Ok(())
    }

    async fn delete(
        &self,
        authority: &AuthorityId,
        id: InstanceId,
        tombstone: Tombstone,
    ) -> Result<()> {
        let mut states = self.states.write().map_err(poison_err)?;
        states.insert((authority.clone(), id), InstanceState::Tombstoned(tombstone));
        Ok(())
    }

    async fn any_with_concept(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<bool> {
        let states = self.states.read().map_err(poison_err)?;
        Ok(states.iter().any(|((a, _), state)| {
            a == authority
                && state
                    .as_instance()
                    .is_some_and(|i| i.concept_id == Some(concept_id))
        }))
    }
}

/// In-memory display configuration store.
///
/// Holds a reference to the authority directory so that
/// `ensure_exists_for_all_authorities` can enumerate partitions.
pub struct MemoryDisplayConfigurationStore {
    directory: Arc<dyn AuthorityDirectory>,
    configs: RwLock<HashMap<(AuthorityId, ConceptId), DisplayConfiguration>>,
}

impl std::fmt::Debug for MemoryDisplayConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDisplayConfigurationStore")
            .finish_non_exhaustive()
    }
}

impl MemoryDisplayConfigurationStore {
    /// Creates an empty store over the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn AuthorityDirectory>) -> Self {
        Self {
            directory,
            configs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DisplayConfigurationStore for MemoryDisplayConfigurationStore {
    async fn find_by_concept(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<Option<DisplayConfiguration>> {
        let configs = self.configs.read().map_err(poison_err)?;
        Ok(configs.get(&(authority.clone(), concept_id)).cloned())
    }

    async fn ensure_exists_for_all_authorities(&self, concept_id: ConceptId) -> Result<()> {
        let authorities = self.directory.authorities().await?;
        let mut configs = self.configs.write().map_err(poison_err)?;
        let now = Utc::now();
        for authority in authorities {
            configs
                .entry((authority.clone(), concept_id))
                .or_insert_with(|| DisplayConfiguration::new_for(authority, concept_id, now));
        }
        Ok(())
    }

    async fn set_instantiated(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
    ) -> Result<()> {
        let mut configs = self.configs.write().map_err(poison_err)?;
        let now = Utc::now();
        configs
            .entry((authority.clone(), concept_id))
            .or_insert_with(|| {
                DisplayConfiguration::new_for(authority.clone(), concept_id, now)
            })
            .mark_instantiated(now);
        Ok(())
    }

    async fn sync_instantiated_flag(
        &self,
        authority: &AuthorityId,
        concept_id: ConceptId,
        concept_in_use: bool,
    ) -> Result<()> {
        let mut configs = self.configs.write().map_err(poison_err)?;
        let now = Utc::now();
        configs
            .entry((authority.clone(), concept_id))
            .or_insert_with(|| {
                DisplayConfiguration::new_for(authority.clone(), concept_id, now)
            })
            .sync_instantiated(concept_in_use, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> AuthorityId {
        AuthorityId::new("gemeente-aarschot").unwrap()
    }

    fn stream() -> StreamId {
        StreamId::new("partner-feed").unwrap()
    }

    #[tokio::test]
    async fn unprocessed_listing_shrinks_as_snapshots_are_marked() {
        let store = MemorySnapshotStore::new();
        let instance_id = InstanceId::generate();
        let snapshot = Snapshot::new(instance_id, Utc::now(), authority());
        let snapshot_id = snapshot.id;
        store.append(&authority(), &stream(), snapshot).unwrap();

        assert_eq!(
            store
                .list_unprocessed(&authority(), &stream())
                .await
                .unwrap()
                .len(),
            1
        );

        store
            .mark_processed(&authority(), &stream(), snapshot_id)
            .await
            .unwrap();

        assert!(store
            .list_unprocessed(&authority(), &stream())
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .is_processed(&authority(), &stream(), snapshot_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn latest_processed_tracks_only_processed_snapshots() {
        let store = MemorySnapshotStore::new();
        let instance_id = InstanceId::generate();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::minutes(5);

        let early = Snapshot::new(instance_id, t1, authority());
        let late = Snapshot::new(instance_id, t2, authority());
        let early_id = early.id;
        store.append(&authority(), &stream(), early).unwrap();
        store.append(&authority(), &stream(), late).unwrap();

        assert!(store
            .latest_processed_generated_at(&authority(), instance_id)
            .await
            .unwrap()
            .is_none());

        store
            .mark_processed(&authority(), &stream(), early_id)
            .await
            .unwrap();

        assert_eq!(
            store
                .latest_processed_generated_at(&authority(), instance_id)
                .await
                .unwrap(),
            Some(t1)
        );
    }

    #[tokio::test]
    async fn get_is_scoped_to_the_authority_partition() {
        let store = MemorySnapshotStore::new();
        let other = AuthorityId::new("stad-leuven").unwrap();
        let snapshot = Snapshot::new(InstanceId::generate(), Utc::now(), other.clone());
        let snapshot_id = snapshot.id;
        store.append(&other, &stream(), snapshot).unwrap();

        let err = store.get(&authority(), snapshot_id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(store.get(&other, snapshot_id).await.is_ok());
    }

    #[tokio::test]
    async fn save_over_tombstone_removes_the_facts() {
        let store = MemoryInstanceStore::new();
        let snapshot = Snapshot::new(InstanceId::generate(), Utc::now(), authority());
        let instance = Instance::materialize(&snapshot, Utc::now());
        let id = instance.id;

        store.save(&authority(), instance.clone()).await.unwrap();
        store
            .delete(
                &authority(),
                id,
                Tombstone::for_instance(&instance, Utc::now()),
            )
            .await
            .unwrap();
        assert!(!store.exists(&authority(), id).await.unwrap());

        store.save(&authority(), instance).await.unwrap();
        assert!(store.exists(&authority(), id).await.unwrap());
        let state = store.state(&authority(), id).await.unwrap().unwrap();
        assert!(state.as_tombstone().is_none());
    }

    #[tokio::test]
    async fn ensure_exists_creates_rows_for_every_authority() {
        let directory = Arc::new(MemoryAuthorityDirectory::new(vec![
            authority(),
            AuthorityId::new("stad-leuven").unwrap(),
        ]));
        let store = MemoryDisplayConfigurationStore::new(directory);
        let concept_id = ConceptId::generate();

        store
            .ensure_exists_for_all_authorities(concept_id)
            .await
            .unwrap();

        let config = store
            .find_by_concept(&authority(), concept_id)
            .await
            .unwrap()
            .unwrap();
        assert!(config.concept_is_new());

        // Existing rows survive a second ensure.
        store.set_instantiated(&authority(), concept_id).await.unwrap();
        store
            .ensure_exists_for_all_authorities(concept_id)
            .await
            .unwrap();
        let config = store
            .find_by_concept(&authority(), concept_id)
            .await
            .unwrap()
            .unwrap();
        assert!(config.concept_is_instantiated());
    }
}
