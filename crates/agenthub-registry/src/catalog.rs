//! Artifact catalog.
//!
//! Creates, looks up, updates and deletes artifacts, and moves their
//! aggregate counters. Visibility is applied on every read: an artifact the
//! caller may not see is reported exactly like one that does not exist.
//! Ownership is checked before any write reaches the store.

use std::sync::Arc;

use tracing::{info, warn};

use agenthub_core::model::timestamp_now;
use agenthub_core::{Artifact, ArtifactId, ArtifactMetadata, ArtifactPatch, Caller, PrincipalId};

use crate::error::{RegistryError, Result};
use crate::store::{Counter, RegistryStore};

/// Check one identity component (`namespace` or `name`).
///
/// Components must be non-empty and free of the reference delimiters `/` and
/// `@` and of whitespace, so every artifact is addressable by a reference.
pub fn validate_identity_part(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RegistryError::invalid(format!("{kind} must not be empty")));
    }
    if let Some(c) = value
        .chars()
        .find(|c| *c == '/' || *c == '@' || c.is_whitespace())
    {
        return Err(RegistryError::invalid(format!(
            "{kind} '{value}' contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// The artifact catalog.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn RegistryStore>,
}

impl Catalog {
    /// Create a catalog over `store`.
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Catalog { store }
    }

    /// Create an artifact owned by `owner`.
    pub fn create_artifact(
        &self,
        namespace: &str,
        name: &str,
        metadata: ArtifactMetadata,
        owner: PrincipalId,
    ) -> Result<Artifact> {
        validate_identity_part("namespace", namespace)?;
        validate_identity_part("name", name)?;

        let artifact = Artifact::new(namespace, name, metadata, owner);
        if let Err(e) = self.store.insert_artifact(&artifact) {
            if matches!(e, RegistryError::ArtifactExists { .. }) {
                warn!(artifact = %artifact.full_name(), "rejected duplicate artifact");
            }
            return Err(e);
        }

        info!(
            artifact = %artifact.full_name(),
            id = %artifact.id,
            owner = %artifact.owner,
            visibility = %artifact.metadata.visibility,
            "created artifact"
        );
        Ok(artifact)
    }

    /// Look up an artifact visible to `caller`.
    pub fn get_artifact(&self, namespace: &str, name: &str, caller: &Caller) -> Result<Artifact> {
        self.store
            .artifact(namespace, name)?
            .filter(|a| a.is_visible_to(caller))
            .ok_or_else(|| RegistryError::ArtifactNotFound {
                artifact: format!("{namespace}/{name}"),
            })
    }

    /// Look up an artifact by id, visible to `caller`.
    pub fn get_artifact_by_id(&self, id: ArtifactId, caller: &Caller) -> Result<Artifact> {
        self.store
            .artifact_by_id(id)?
            .filter(|a| a.is_visible_to(caller))
            .ok_or_else(|| RegistryError::ArtifactNotFound {
                artifact: id.to_string(),
            })
    }

    /// Apply a partial metadata update. Owner only.
    pub fn update_artifact(
        &self,
        artifact: &Artifact,
        patch: &ArtifactPatch,
        caller: &Caller,
    ) -> Result<Artifact> {
        Self::require_owner(artifact, caller, "update")?;
        let updated = self
            .store
            .update_artifact(artifact.id, patch, timestamp_now())?
            .ok_or_else(|| RegistryError::ArtifactNotFound {
                artifact: artifact.full_name(),
            })?;
        info!(artifact = %updated.full_name(), "updated artifact");
        Ok(updated)
    }

    /// Delete an artifact and all of its versions. Owner only.
    pub fn delete_artifact(&self, artifact: &Artifact, caller: &Caller) -> Result<()> {
        Self::require_owner(artifact, caller, "delete")?;
        if !self.store.delete_artifact(artifact.id)? {
            return Err(RegistryError::ArtifactNotFound {
                artifact: artifact.full_name(),
            });
        }
        info!(artifact = %artifact.full_name(), id = %artifact.id, "deleted artifact");
        Ok(())
    }

    /// Count one download. Returns the new total; `ArtifactNotFound` if the
    /// artifact is gone.
    pub fn increment_downloads(&self, id: ArtifactId) -> Result<u64> {
        self.adjust(id, Counter::Downloads, true)
    }

    /// Add one like. Returns the new total.
    pub fn increment_likes(&self, id: ArtifactId) -> Result<u64> {
        self.adjust(id, Counter::Likes, true)
    }

    /// Remove one like, saturating at zero. Returns the new total.
    pub fn decrement_likes(&self, id: ArtifactId) -> Result<u64> {
        self.adjust(id, Counter::Likes, false)
    }

    fn adjust(&self, id: ArtifactId, counter: Counter, up: bool) -> Result<u64> {
        let value = if up {
            self.store.increment_counter(id, counter)?
        } else {
            self.store.decrement_counter(id, counter)?
        };
        value.ok_or_else(|| RegistryError::ArtifactNotFound {
            artifact: id.to_string(),
        })
    }

    fn require_owner(artifact: &Artifact, caller: &Caller, action: &str) -> Result<()> {
        if artifact.is_owned_by(caller) {
            Ok(())
        } else {
            Err(RegistryError::forbidden(format!(
                "{action} {}",
                artifact.full_name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use agenthub_core::Visibility;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(MemoryStore::new()))
    }

    fn alice() -> Caller {
        Caller::authenticated("u-alice")
    }

    fn create(catalog: &Catalog, name: &str, visibility: Visibility) -> Artifact {
        catalog
            .create_artifact(
                "alice",
                name,
                ArtifactMetadata::default().with_visibility(visibility),
                PrincipalId::new("u-alice"),
            )
            .unwrap()
    }

    #[test]
    fn identity_validation() {
        assert!(validate_identity_part("name", "code-reviewer").is_ok());
        for bad in ["", "a/b", "bot@1", "my bot"] {
            assert!(matches!(
                validate_identity_part("name", bad),
                Err(RegistryError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn create_then_get() {
        let catalog = catalog();
        let created = create(&catalog, "bot", Visibility::Public);
        let fetched = catalog
            .get_artifact("alice", "bot", &Caller::anonymous())
            .unwrap();
        assert_eq!(created, fetched);
        assert_eq!(
            catalog.get_artifact_by_id(created.id, &alice()).unwrap(),
            created
        );
    }

    #[test]
    fn identity_is_case_sensitive() {
        let catalog = catalog();
        create(&catalog, "bot", Visibility::Public);
        create(&catalog, "Bot", Visibility::Public);
        let err = catalog
            .create_artifact("alice", "bot", ArtifactMetadata::default(), PrincipalId::new("u-x"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactExists { .. }));
    }

    #[test]
    fn private_hidden_from_others() {
        let catalog = catalog();
        create(&catalog, "secret", Visibility::Private);
        for caller in [Caller::anonymous(), Caller::authenticated("u-bob")] {
            assert!(matches!(
                catalog.get_artifact("alice", "secret", &caller),
                Err(RegistryError::ArtifactNotFound { .. })
            ));
        }
        assert!(catalog.get_artifact("alice", "secret", &alice()).is_ok());
    }

    #[test]
    fn unlisted_visible_by_identity() {
        let catalog = catalog();
        create(&catalog, "quiet", Visibility::Unlisted);
        assert!(catalog
            .get_artifact("alice", "quiet", &Caller::anonymous())
            .is_ok());
    }

    #[test]
    fn non_owner_update_is_forbidden_and_changes_nothing() {
        let catalog = catalog();
        let artifact = create(&catalog, "bot", Visibility::Public);
        let patch = ArtifactPatch {
            description: Some("hijacked".into()),
            ..Default::default()
        };
        for caller in [Caller::anonymous(), Caller::authenticated("u-bob")] {
            assert!(matches!(
                catalog.update_artifact(&artifact, &patch, &caller),
                Err(RegistryError::Forbidden { .. })
            ));
        }
        let unchanged = catalog.get_artifact("alice", "bot", &alice()).unwrap();
        assert_eq!(unchanged.metadata.description, "");
        assert_eq!(unchanged.updated_at, artifact.updated_at);
    }

    #[test]
    fn owner_update_bumps_updated_at() {
        let catalog = catalog();
        let artifact = create(&catalog, "bot", Visibility::Public);
        let patch = ArtifactPatch {
            description: Some("Reviews code".into()),
            ..Default::default()
        };
        let updated = catalog.update_artifact(&artifact, &patch, &alice()).unwrap();
        assert_eq!(updated.metadata.description, "Reviews code");
        assert!(updated.updated_at >= artifact.updated_at);
        assert_eq!(updated.created_at, artifact.created_at);
    }

    #[test]
    fn delete_is_owner_only() {
        let catalog = catalog();
        let artifact = create(&catalog, "bot", Visibility::Public);
        assert!(matches!(
            catalog.delete_artifact(&artifact, &Caller::authenticated("u-bob")),
            Err(RegistryError::Forbidden { .. })
        ));
        catalog.delete_artifact(&artifact, &alice()).unwrap();
        assert!(catalog.get_artifact("alice", "bot", &alice()).is_err());
        assert!(matches!(
            catalog.delete_artifact(&artifact, &alice()),
            Err(RegistryError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn counters() {
        let catalog = catalog();
        let artifact = create(&catalog, "bot", Visibility::Public);
        assert_eq!(catalog.decrement_likes(artifact.id).unwrap(), 0);
        assert_eq!(catalog.increment_likes(artifact.id).unwrap(), 1);
        assert_eq!(catalog.increment_downloads(artifact.id).unwrap(), 1);
        assert_eq!(catalog.decrement_likes(artifact.id).unwrap(), 0);
        assert!(matches!(
            catalog.increment_downloads(ArtifactId::new()),
            Err(RegistryError::ArtifactNotFound { .. })
        ));
    }
}
