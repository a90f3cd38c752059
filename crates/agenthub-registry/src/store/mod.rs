//! Store of record.
//!
//! The `RegistryStore` trait abstracts over storage engines. Every method is
//! a single atomic step against the store: the components above it never
//! compose two store calls into one invariant. Two engines are provided:
//!
//! - [`MemoryStore`]: in-process maps with per-artifact locks, for tests and
//!   embedded use
//! - [`SqliteStore`]: a SQLite database file in WAL mode

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agenthub_core::{Artifact, ArtifactId, ArtifactPatch, Category, Version, VersionId};

use crate::config::StorageConfig;
use crate::error::{RegistryError, Result};
use crate::query::{ArtifactQuery, Page, PageRequest};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// An aggregate artifact counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Downloads,
    Likes,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Downloads => "downloads",
            Counter::Likes => "likes",
        }
    }
}

/// Abstract store of record.
///
/// Lookups return `Ok(None)` for absent rows; the caller decides which
/// not-found error to report. Counter methods return the new value, or
/// `None` when the row does not exist.
pub trait RegistryStore: Send + Sync {
    /// Short engine name for logs.
    fn engine(&self) -> &'static str;

    /// Insert a new artifact. Fails `ArtifactExists` on an identity clash.
    fn insert_artifact(&self, artifact: &Artifact) -> Result<()>;

    /// Look up an artifact by exact `(namespace, name)`.
    fn artifact(&self, namespace: &str, name: &str) -> Result<Option<Artifact>>;

    /// Look up an artifact by id.
    fn artifact_by_id(&self, id: ArtifactId) -> Result<Option<Artifact>>;

    /// Apply a metadata patch and set `updated_at`.
    fn update_artifact(
        &self,
        id: ArtifactId,
        patch: &ArtifactPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Artifact>>;

    /// Remove an artifact and every version under it. Returns whether a row
    /// was removed.
    fn delete_artifact(&self, id: ArtifactId) -> Result<bool>;

    /// Add one to a counter.
    fn increment_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>>;

    /// Subtract one from a counter, saturating at zero.
    fn decrement_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>>;

    /// Clear the latest flag on every version of `artifact`, insert `version`
    /// as the new latest and bump the artifact's `updated_at`, all in one
    /// atomic step.
    ///
    /// `published_at` is stamped inside that step, never earlier than the
    /// replaced latest, and returned; the value carried by `version` is
    /// ignored. Fails `VersionExists` when the version string is taken and
    /// `ArtifactNotFound` when the artifact was deleted meanwhile.
    fn insert_latest_version(
        &self,
        artifact: &Artifact,
        version: &Version,
    ) -> Result<DateTime<Utc>>;

    /// Look up a version by exact version string.
    fn version(&self, artifact_id: ArtifactId, version: &str) -> Result<Option<Version>>;

    /// The version carrying the latest flag, if any.
    fn latest_version(&self, artifact_id: ArtifactId) -> Result<Option<Version>>;

    /// Every version of an artifact, most recently published first.
    fn versions(&self, artifact_id: ArtifactId) -> Result<Vec<Version>>;

    /// Add one to a version's download counter.
    fn increment_version_downloads(
        &self,
        artifact_id: ArtifactId,
        version_id: VersionId,
    ) -> Result<Option<u64>>;

    /// Filter, sort and paginate artifacts.
    fn query_artifacts(&self, query: &ArtifactQuery, page: PageRequest)
        -> Result<Page<Artifact>>;

    /// Public artifact count per category.
    fn category_counts(&self) -> Result<BTreeMap<Category, u64>>;
}

/// Which engine backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Open the store described by `config`.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn RegistryStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.path.as_deref().ok_or_else(|| {
                RegistryError::invalid("storage.path is required for the sqlite backend")
            })?;
            Ok(Arc::new(SqliteStore::open(path, config.busy_timeout())?))
        }
    }
}
