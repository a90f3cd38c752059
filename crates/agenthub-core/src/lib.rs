//! Core domain model for the AgentHub registry.
//!
//! Defines the two entities the registry protects, [`Artifact`] and
//! [`Version`], along with the pieces every layer shares:
//!
//! - **Digests**: SHA-256 fingerprints over the exact payload bytes
//! - **Model**: identities, visibility, categories, counters, timestamps
//! - **Spec envelopes**: the `agentspec` document shape, with a tagged
//!   runtime variant, for callers that want to inspect a payload
//!
//! The registry engine itself treats every payload as opaque bytes plus a
//! digest; nothing in this crate performs I/O.

pub mod digest;
pub mod error;
pub mod model;
pub mod spec;

// Re-exports for convenience.
pub use digest::ContentDigest;
pub use error::{CoreError, Result};
pub use model::{
    Artifact, ArtifactId, ArtifactMetadata, ArtifactPatch, Caller, Category, PrincipalId,
    Version, VersionId, VersionStatus, Visibility,
};
pub use spec::{AgentSpec, Runtime};
