//! Version ledger.
//!
//! Appends immutable versions under an artifact and keeps the latest
//! pointer. A publish is one store step: clear the previous latest flag,
//! insert the new version flagged latest and bump the artifact's
//! `updated_at`. Duplicate version strings are rejected inside that step,
//! never by a separate existence check.

use std::sync::Arc;

use tracing::{info, warn};

use agenthub_core::model::timestamp_now;
use agenthub_core::{Artifact, ContentDigest, PrincipalId, Version, VersionId, VersionStatus};

use crate::error::{RegistryError, Result};
use crate::store::RegistryStore;

/// The version ledger.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn RegistryStore>,
    max_payload_bytes: u64,
}

impl Ledger {
    /// Create a ledger over `store`, rejecting payloads larger than
    /// `max_payload_bytes`.
    pub fn new(store: Arc<dyn RegistryStore>, max_payload_bytes: u64) -> Self {
        Ledger {
            store,
            max_payload_bytes,
        }
    }

    /// Publish `payload` as `version` and make it the latest.
    pub fn publish_version(
        &self,
        artifact: &Artifact,
        version: &str,
        payload: Vec<u8>,
        changelog: &str,
        publisher: &PrincipalId,
    ) -> Result<Version> {
        if version.is_empty() {
            return Err(RegistryError::invalid("version must not be empty"));
        }
        let digest = ContentDigest::compute_bounded(&payload, self.max_payload_bytes)?;

        let mut record = Version {
            id: VersionId::new(),
            artifact_id: artifact.id,
            version: version.to_string(),
            size: payload.len() as u64,
            payload,
            digest,
            changelog: changelog.to_string(),
            is_latest: true,
            status: VersionStatus::Active,
            published_at: timestamp_now(),
            published_by: publisher.clone(),
            downloads: 0,
        };

        match self.store.insert_latest_version(artifact, &record) {
            Ok(published_at) => record.published_at = published_at,
            Err(e) => {
                if matches!(e, RegistryError::VersionExists { .. }) {
                    warn!(
                        artifact = %artifact.full_name(),
                        version = %record.version,
                        "rejected duplicate version"
                    );
                }
                return Err(e);
            }
        }

        info!(
            artifact = %artifact.full_name(),
            version = %record.version,
            digest = %record.digest,
            size = record.size,
            publisher = %publisher,
            "published version"
        );
        Ok(record)
    }

    /// Look up a version by exact version string.
    pub fn get_version(&self, artifact: &Artifact, version: &str) -> Result<Version> {
        self.store
            .version(artifact.id, version)?
            .ok_or_else(|| RegistryError::VersionNotFound {
                artifact: artifact.full_name(),
                version: version.to_string(),
            })
    }

    /// The version flagged latest. Never falls back to another version.
    pub fn get_latest_version(&self, artifact: &Artifact) -> Result<Version> {
        self.store
            .latest_version(artifact.id)?
            .ok_or_else(|| RegistryError::NoLatestVersion {
                artifact: artifact.full_name(),
            })
    }

    /// Every version, most recent first.
    pub fn list_versions(&self, artifact: &Artifact) -> Result<Vec<Version>> {
        self.store.versions(artifact.id)
    }

    /// Count one download of `version`. Returns the new count.
    pub fn record_download(&self, version: &Version) -> Result<u64> {
        self.store
            .increment_version_downloads(version.artifact_id, version.id)?
            .ok_or_else(|| RegistryError::VersionNotFound {
                artifact: version.artifact_id.to_string(),
                version: version.version.clone(),
            })
    }
}
