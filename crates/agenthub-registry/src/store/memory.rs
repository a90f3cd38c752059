//! In-memory store engine.
//!
//! The identity index sits behind one `RwLock` that is held only for lookups,
//! inserts and deletes. Each artifact owns its own `RwLock` guarding its
//! metadata and versions, so a publish locks only the artifact it touches.
//! Aggregate counters are atomics and never take the artifact lock.
//!
//! Lock order is index before entry. Nothing takes the index lock while
//! holding an entry lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use agenthub_core::model::timestamp_now;
use agenthub_core::{
    Artifact, ArtifactId, ArtifactPatch, Category, Version, VersionId, Visibility,
};

use super::{Counter, RegistryStore};
use crate::error::{RegistryError, Result};
use crate::query::{self, ArtifactQuery, Page, PageRequest};

/// In-process store of record.
#[derive(Default)]
pub struct MemoryStore {
    index: RwLock<Index>,
}

#[derive(Default)]
struct Index {
    by_name: HashMap<(String, String), ArtifactId>,
    entries: HashMap<ArtifactId, Arc<Entry>>,
}

struct Entry {
    state: RwLock<EntryState>,
    downloads: AtomicU64,
    likes: AtomicU64,
}

struct EntryState {
    /// Counter fields in here are stale; the atomics are authoritative.
    artifact: Artifact,
    /// Cleared under the write lock when the artifact is deleted.
    live: bool,
    /// Insertion order.
    versions: Vec<Arc<VersionSlot>>,
    by_version: HashMap<String, usize>,
    latest: Option<usize>,
}

struct VersionSlot {
    /// `is_latest` and `downloads` in here are stale.
    version: Version,
    downloads: AtomicU64,
}

impl Entry {
    fn new(artifact: &Artifact) -> Self {
        Entry {
            downloads: AtomicU64::new(artifact.downloads),
            likes: AtomicU64::new(artifact.likes),
            state: RwLock::new(EntryState {
                artifact: artifact.clone(),
                live: true,
                versions: Vec::new(),
                by_version: HashMap::new(),
                latest: None,
            }),
        }
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Downloads => &self.downloads,
            Counter::Likes => &self.likes,
        }
    }

    fn snapshot(&self, state: &EntryState) -> Artifact {
        let mut artifact = state.artifact.clone();
        artifact.downloads = self.downloads.load(Ordering::SeqCst);
        artifact.likes = self.likes.load(Ordering::SeqCst);
        artifact
    }

    /// Current artifact, or `None` once deleted.
    fn artifact(&self) -> Option<Artifact> {
        let state = self.state.read();
        state.live.then(|| self.snapshot(&state))
    }
}

impl EntryState {
    fn materialize(&self, index: usize) -> Version {
        let slot = &self.versions[index];
        let mut version = slot.version.clone();
        version.is_latest = self.latest == Some(index);
        version.downloads = slot.downloads.load(Ordering::SeqCst);
        version
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live artifacts.
    pub fn artifact_count(&self) -> usize {
        self.index.read().entries.len()
    }

    fn entry(&self, id: ArtifactId) -> Option<Arc<Entry>> {
        self.index.read().entries.get(&id).cloned()
    }

    fn live_artifacts(&self) -> Vec<Artifact> {
        let entries: Vec<Arc<Entry>> = self.index.read().entries.values().cloned().collect();
        entries.iter().filter_map(|e| e.artifact()).collect()
    }
}

impl RegistryStore for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut index = self.index.write();
        let key = (artifact.namespace.clone(), artifact.name.clone());
        if index.by_name.contains_key(&key) {
            return Err(RegistryError::ArtifactExists {
                artifact: artifact.full_name(),
            });
        }
        index.by_name.insert(key, artifact.id);
        index.entries.insert(artifact.id, Arc::new(Entry::new(artifact)));
        Ok(())
    }

    fn artifact(&self, namespace: &str, name: &str) -> Result<Option<Artifact>> {
        let entry = {
            let index = self.index.read();
            index
                .by_name
                .get(&(namespace.to_string(), name.to_string()))
                .and_then(|id| index.entries.get(id))
                .cloned()
        };
        Ok(entry.and_then(|e| e.artifact()))
    }

    fn artifact_by_id(&self, id: ArtifactId) -> Result<Option<Artifact>> {
        Ok(self.entry(id).and_then(|e| e.artifact()))
    }

    fn update_artifact(
        &self,
        id: ArtifactId,
        patch: &ArtifactPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Artifact>> {
        let Some(entry) = self.entry(id) else {
            return Ok(None);
        };
        let mut state = entry.state.write();
        if !state.live {
            return Ok(None);
        }
        patch.apply_to(&mut state.artifact.metadata);
        state.artifact.updated_at = updated_at;
        Ok(Some(entry.snapshot(&state)))
    }

    fn delete_artifact(&self, id: ArtifactId) -> Result<bool> {
        let mut index = self.index.write();
        let Some(entry) = index.entries.remove(&id) else {
            return Ok(false);
        };
        let mut state = entry.state.write();
        index
            .by_name
            .remove(&(state.artifact.namespace.clone(), state.artifact.name.clone()));
        state.live = false;
        state.versions.clear();
        state.by_version.clear();
        state.latest = None;
        Ok(true)
    }

    fn increment_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>> {
        let index = self.index.read();
        Ok(index
            .entries
            .get(&id)
            .map(|e| e.counter(counter).fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn decrement_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>> {
        let index = self.index.read();
        Ok(index.entries.get(&id).map(|e| {
            let previous = e
                .counter(counter)
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                    Some(v.saturating_sub(1))
                })
                .unwrap_or_else(|v| v);
            previous.saturating_sub(1)
        }))
    }

    fn insert_latest_version(
        &self,
        artifact: &Artifact,
        version: &Version,
    ) -> Result<DateTime<Utc>> {
        let not_found = || RegistryError::ArtifactNotFound {
            artifact: artifact.full_name(),
        };
        let entry = self.entry(artifact.id).ok_or_else(not_found)?;

        let mut state = entry.state.write();
        if !state.live {
            return Err(not_found());
        }
        if state.by_version.contains_key(&version.version) {
            return Err(RegistryError::VersionExists {
                artifact: artifact.full_name(),
                version: version.version.clone(),
            });
        }

        // Stamped under the entry lock so the latest is never older than
        // the version it replaces.
        let now = timestamp_now();
        let published_at = match state.latest {
            Some(index) => now.max(state.versions[index].version.published_at),
            None => now,
        };
        let mut record = version.clone();
        record.published_at = published_at;
        record.is_latest = true;

        let slot = VersionSlot {
            downloads: AtomicU64::new(record.downloads),
            version: record,
        };
        let position = state.versions.len();
        state.versions.push(Arc::new(slot));
        state.by_version.insert(version.version.clone(), position);
        state.latest = Some(position);
        state.artifact.updated_at = state.artifact.updated_at.max(published_at);
        Ok(published_at)
    }

    fn version(&self, artifact_id: ArtifactId, version: &str) -> Result<Option<Version>> {
        let Some(entry) = self.entry(artifact_id) else {
            return Ok(None);
        };
        let state = entry.state.read();
        Ok(state
            .by_version
            .get(version)
            .map(|&index| state.materialize(index)))
    }

    fn latest_version(&self, artifact_id: ArtifactId) -> Result<Option<Version>> {
        let Some(entry) = self.entry(artifact_id) else {
            return Ok(None);
        };
        let state = entry.state.read();
        Ok(state.latest.map(|index| state.materialize(index)))
    }

    fn versions(&self, artifact_id: ArtifactId) -> Result<Vec<Version>> {
        let Some(entry) = self.entry(artifact_id) else {
            return Ok(Vec::new());
        };
        let state = entry.state.read();
        let mut versions: Vec<Version> = (0..state.versions.len())
            .rev()
            .map(|index| state.materialize(index))
            .collect();
        // Stable: equal timestamps keep newest-inserted first.
        versions.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(versions)
    }

    fn increment_version_downloads(
        &self,
        artifact_id: ArtifactId,
        version_id: VersionId,
    ) -> Result<Option<u64>> {
        let Some(entry) = self.entry(artifact_id) else {
            return Ok(None);
        };
        let state = entry.state.read();
        Ok(state
            .versions
            .iter()
            .find(|slot| slot.version.id == version_id)
            .map(|slot| slot.downloads.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn query_artifacts(
        &self,
        query: &ArtifactQuery,
        page: PageRequest,
    ) -> Result<Page<Artifact>> {
        Ok(query::evaluate(self.live_artifacts(), query, page))
    }

    fn category_counts(&self) -> Result<BTreeMap<Category, u64>> {
        let mut counts = BTreeMap::new();
        for artifact in self.live_artifacts() {
            if artifact.metadata.visibility == Visibility::Public {
                *counts.entry(artifact.metadata.category).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenthub_core::{ArtifactMetadata, ContentDigest, PrincipalId, VersionStatus};

    fn artifact(name: &str) -> Artifact {
        Artifact::new(
            "alice",
            name,
            ArtifactMetadata::default(),
            PrincipalId::new("u-alice"),
        )
    }

    fn version(artifact: &Artifact, v: &str) -> Version {
        let payload = v.as_bytes().to_vec();
        Version {
            id: VersionId::new(),
            artifact_id: artifact.id,
            version: v.to_string(),
            digest: ContentDigest::compute(&payload),
            size: payload.len() as u64,
            payload,
            changelog: String::new(),
            is_latest: true,
            status: VersionStatus::Active,
            published_at: timestamp_now(),
            published_by: artifact.owner.clone(),
            downloads: 0,
        }
    }

    #[test]
    fn duplicate_identity_rejected() {
        let store = MemoryStore::new();
        store.insert_artifact(&artifact("bot")).unwrap();
        let err = store.insert_artifact(&artifact("bot")).unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactExists { .. }));
        assert_eq!(store.artifact_count(), 1);
    }

    #[test]
    fn latest_moves_on_publish() {
        let store = MemoryStore::new();
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        let v1 = version(&a, "1.0.0");
        let v2 = version(&a, "1.1.0");
        store.insert_latest_version(&a, &v1).unwrap();
        let stamped = store.insert_latest_version(&a, &v2).unwrap();

        assert_eq!(store.latest_version(a.id).unwrap().unwrap().version, "1.1.0");
        assert!(!store.version(a.id, "1.0.0").unwrap().unwrap().is_latest);
        let all = store.versions(a.id).unwrap();
        assert_eq!(all.iter().filter(|v| v.is_latest).count(), 1);
        assert_eq!(all[0].version, "1.1.0");
        assert_eq!(
            store.artifact_by_id(a.id).unwrap().unwrap().updated_at,
            stamped
        );
        assert_eq!(all[0].published_at, stamped);
    }

    #[test]
    fn stale_timestamp_never_precedes_latest() {
        let store = MemoryStore::new();
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        let mut stale = version(&a, "1.0.0");
        stale.published_at = DateTime::<Utc>::UNIX_EPOCH;
        let first = store.insert_latest_version(&a, &version(&a, "2.0.0")).unwrap();
        let second = store.insert_latest_version(&a, &stale).unwrap();

        assert!(second >= first);
        let all = store.versions(a.id).unwrap();
        assert_eq!(all[0].version, "1.0.0");
        assert!(all[0].is_latest);
        assert_eq!(store.artifact_by_id(a.id).unwrap().unwrap().updated_at, second);
    }

    #[test]
    fn publish_after_delete_is_not_found() {
        let store = MemoryStore::new();
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        assert!(store.delete_artifact(a.id).unwrap());
        let err = store
            .insert_latest_version(&a, &version(&a, "1.0.0"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactNotFound { .. }));
        assert!(store.artifact("alice", "bot").unwrap().is_none());
        assert!(!store.delete_artifact(a.id).unwrap());
    }

    #[test]
    fn counters_saturate_at_zero() {
        let store = MemoryStore::new();
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        assert_eq!(store.decrement_counter(a.id, Counter::Likes).unwrap(), Some(0));
        assert_eq!(store.increment_counter(a.id, Counter::Likes).unwrap(), Some(1));
        assert_eq!(store.decrement_counter(a.id, Counter::Likes).unwrap(), Some(0));
        assert_eq!(
            store.increment_counter(ArtifactId::new(), Counter::Downloads).unwrap(),
            None
        );
    }

    #[test]
    fn version_downloads_are_per_version() {
        let store = MemoryStore::new();
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        let v1 = version(&a, "1.0.0");
        store.insert_latest_version(&a, &v1).unwrap();
        assert_eq!(
            store.increment_version_downloads(a.id, v1.id).unwrap(),
            Some(1)
        );
        assert_eq!(store.version(a.id, "1.0.0").unwrap().unwrap().downloads, 1);
        assert_eq!(
            store.increment_version_downloads(a.id, VersionId::new()).unwrap(),
            None
        );
    }
}
