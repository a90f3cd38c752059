//! Artifact and version entities.
//!
//! An [`Artifact`] is a `(namespace, name)` identity with metadata and
//! aggregate counters. A [`Version`] is one immutable payload published under
//! an artifact. Exactly one version per non-empty artifact carries
//! `is_latest = true`; the engine enforces that, these types only carry it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::digest::ContentDigest;

/// Current time, truncated to microseconds so every store engine round-trips
/// it without loss.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Unique identifier of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        ArtifactId(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        ArtifactId(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        VersionId(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        VersionId(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a principal, as supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Wrap an id issued by the auth collaborator.
    pub fn new(id: impl Into<String>) -> Self {
        PrincipalId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-request auth fact handed to the registry.
///
/// The registry never validates credentials; it only asks who is calling and
/// whether that principal owns the artifact being touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No authenticated principal.
    Anonymous,
    /// An authenticated principal.
    Authenticated(PrincipalId),
}

impl Caller {
    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Caller::Anonymous
    }

    /// An authenticated caller.
    pub fn authenticated(principal: impl Into<String>) -> Self {
        Caller::Authenticated(PrincipalId::new(principal))
    }

    /// The authenticated principal, if any.
    pub fn principal(&self) -> Option<&PrincipalId> {
        match self {
            Caller::Anonymous => None,
            Caller::Authenticated(id) => Some(id),
        }
    }

    /// Whether a principal is attached.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::Authenticated(_))
    }

    /// Whether this caller is the given owner.
    pub fn is(&self, owner: &PrincipalId) -> bool {
        self.principal() == Some(owner)
    }
}

/// Who may see an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to everyone and listed in the catalog.
    #[default]
    Public,
    /// Visible only to the owner.
    Private,
    /// Visible to anyone holding the reference, never listed.
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
        }
    }

    /// Pure visibility predicate over `(visibility, caller, owner)`.
    pub fn permits(&self, owner: &PrincipalId, caller: &Caller) -> bool {
        match self {
            Visibility::Public | Visibility::Unlisted => true,
            Visibility::Private => caller.is(owner),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            other => Err(format!(
                "unknown visibility '{other}' (expected public, private or unlisted)"
            )),
        }
    }
}

/// Known category facets and their display labels.
pub const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("assistant", "General Assistant"),
    ("coding", "Coding"),
    ("writing", "Writing"),
    ("analysis", "Data Analysis"),
    ("creative", "Creative Design"),
    ("education", "Education"),
    ("business", "Business"),
    ("research", "Research"),
    ("tooling", "Tooling"),
    ("other", "Other"),
];

/// An artifact category.
///
/// Any string is accepted on an artifact; only the known set is usable as a
/// listing facet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Any category id; see [`Category::is_known`].
    pub fn new(id: impl Into<String>) -> Self {
        Category(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of [`KNOWN_CATEGORIES`].
    pub fn is_known(&self) -> bool {
        KNOWN_CATEGORIES.iter().any(|(id, _)| *id == self.0)
    }

    /// Display label for known categories.
    pub fn label(&self) -> Option<&'static str> {
        KNOWN_CATEGORIES
            .iter()
            .find(|(id, _)| *id == self.0)
            .map(|(_, label)| *label)
    }

    /// All known categories, in facet order.
    pub fn known() -> impl Iterator<Item = Category> {
        KNOWN_CATEGORIES.iter().map(|(id, _)| Category::new(*id))
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::new("other")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Pending,
    #[default]
    Active,
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Pending => "pending",
            VersionStatus::Active => "active",
            VersionStatus::Deprecated => "deprecated",
        }
    }
}

impl FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VersionStatus::Pending),
            "active" => Ok(VersionStatus::Active),
            "deprecated" => Ok(VersionStatus::Deprecated),
            other => Err(format!("unknown version status '{other}'")),
        }
    }
}

/// Owner-editable artifact metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

impl ArtifactMetadata {
    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Category::new(category);
        self
    }

    /// Builder: set visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder: set license.
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }
}

/// A partial metadata update. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

impl ArtifactPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == ArtifactPatch::default()
    }

    /// Apply the present fields onto `metadata`.
    pub fn apply_to(&self, metadata: &mut ArtifactMetadata) {
        if let Some(description) = &self.description {
            metadata.description = description.clone();
        }
        if let Some(category) = &self.category {
            metadata.category = category.clone();
        }
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
        if let Some(visibility) = self.visibility {
            metadata.visibility = visibility;
        }
        if let Some(license) = &self.license {
            metadata.license = Some(license.clone());
        }
        if let Some(homepage) = &self.homepage {
            metadata.homepage = Some(homepage.clone());
        }
        if let Some(repository) = &self.repository {
            metadata.repository = Some(repository.clone());
        }
    }
}

/// A named, versioned package identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub namespace: String,
    pub name: String,
    #[serde(flatten)]
    pub metadata: ArtifactMetadata,
    pub owner: PrincipalId,
    pub downloads: u64,
    pub likes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a fresh artifact with zeroed counters and `created_at = updated_at = now`.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        metadata: ArtifactMetadata,
        owner: PrincipalId,
    ) -> Self {
        let now = timestamp_now();
        Artifact {
            id: ArtifactId::new(),
            namespace: namespace.into(),
            name: name.into(),
            metadata,
            owner,
            downloads: 0,
            likes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `namespace/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether `caller` may see this artifact.
    pub fn is_visible_to(&self, caller: &Caller) -> bool {
        self.metadata.visibility.permits(&self.owner, caller)
    }

    /// Whether `caller` owns this artifact.
    pub fn is_owned_by(&self, caller: &Caller) -> bool {
        caller.is(&self.owner)
    }
}

/// One immutable published payload under an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub artifact_id: ArtifactId,
    /// Opaque version string, unique per artifact.
    pub version: String,
    pub payload: Vec<u8>,
    pub digest: ContentDigest,
    pub size: u64,
    pub changelog: String,
    pub is_latest: bool,
    pub status: VersionStatus,
    pub published_at: DateTime<Utc>,
    pub published_by: PrincipalId,
    pub downloads: u64,
}

impl Version {
    /// The payload as UTF-8 text, when it is text.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Check that the stored payload still matches its digest and size.
    pub fn verify(&self) -> bool {
        self.size == self.payload.len() as u64 && self.digest.verify(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> PrincipalId {
        PrincipalId::new("u-alice")
    }

    #[test]
    fn private_visible_only_to_owner() {
        let vis = Visibility::Private;
        assert!(vis.permits(&owner(), &Caller::authenticated("u-alice")));
        assert!(!vis.permits(&owner(), &Caller::authenticated("u-bob")));
        assert!(!vis.permits(&owner(), &Caller::anonymous()));
    }

    #[test]
    fn public_and_unlisted_visible_to_all() {
        for vis in [Visibility::Public, Visibility::Unlisted] {
            assert!(vis.permits(&owner(), &Caller::anonymous()));
            assert!(vis.permits(&owner(), &Caller::authenticated("u-bob")));
        }
    }

    #[test]
    fn visibility_parse() {
        assert_eq!("public".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!(
            "unlisted".parse::<Visibility>().unwrap(),
            Visibility::Unlisted
        );
        assert!("Public".parse::<Visibility>().is_err());
    }

    #[test]
    fn known_categories() {
        assert!(Category::new("coding").is_known());
        assert_eq!(Category::new("coding").label(), Some("Coding"));
        assert!(!Category::new("robots").is_known());
        assert_eq!(Category::known().count(), KNOWN_CATEGORIES.len());
        assert_eq!(Category::default().as_str(), "other");
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut metadata = ArtifactMetadata::default()
            .with_description("old")
            .with_category("coding")
            .with_license("MIT");
        let patch = ArtifactPatch {
            description: Some("new".into()),
            visibility: Some(Visibility::Private),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply_to(&mut metadata);

        assert_eq!(metadata.description, "new");
        assert_eq!(metadata.visibility, Visibility::Private);
        assert_eq!(metadata.category.as_str(), "coding");
        assert_eq!(metadata.license.as_deref(), Some("MIT"));
        assert!(ArtifactPatch::default().is_empty());
    }

    #[test]
    fn new_artifact_initial_state() {
        let artifact = Artifact::new("alice", "bot", ArtifactMetadata::default(), owner());
        assert_eq!(artifact.full_name(), "alice/bot");
        assert_eq!(artifact.downloads, 0);
        assert_eq!(artifact.likes, 0);
        assert_eq!(artifact.created_at, artifact.updated_at);
        assert!(artifact.is_owned_by(&Caller::authenticated("u-alice")));
        assert!(!artifact.is_owned_by(&Caller::anonymous()));
    }

    #[test]
    fn timestamps_have_microsecond_precision() {
        let now = timestamp_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn version_verify_detects_tampering() {
        let payload = b"runtime:\n  type: prompt\n".to_vec();
        let mut version = Version {
            id: VersionId::new(),
            artifact_id: ArtifactId::new(),
            version: "1.0.0".into(),
            digest: ContentDigest::compute(&payload),
            size: payload.len() as u64,
            payload,
            changelog: String::new(),
            is_latest: true,
            status: VersionStatus::Active,
            published_at: timestamp_now(),
            published_by: owner(),
            downloads: 0,
        };
        assert!(version.verify());
        assert!(version.payload_str().is_some());

        version.payload.push(b'!');
        assert!(!version.verify());
    }
}
