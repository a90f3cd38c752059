//! Registry engine for AgentHub.
//!
//! Owns the artifact catalog and version ledger and answers every read the
//! hub serves: detail, reference resolution and catalog listings. Payloads
//! are opaque bytes addressed by digest.
//!
//! # Architecture
//!
//! - **Catalog**: artifact identity, metadata, visibility, counters
//! - **Ledger**: immutable versions and the single latest pointer
//! - **Reference resolver**: `namespace/name@selector` to a concrete version
//! - **Query engine**: filtered, sorted, paginated catalog listings
//! - **Store**: the store of record, in memory or SQLite
//!
//! [`Registry`] wires these together behind caller checks for a transport
//! layer.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod query;
pub mod reference;
pub mod registry;
pub mod store;
pub mod version;

// Re-exports for convenience.
pub use catalog::Catalog;
pub use config::{NamespacePolicy, RegistryConfig};
pub use error::{ErrorKind, RegistryError, Result};
pub use ledger::Ledger;
pub use query::{ArtifactFilter, ArtifactQuery, Page, PageRequest, QueryEngine, Scope, SortKey};
pub use reference::{Reference, Resolved, Resolver, VersionSelector, DEFAULT_NAMESPACE, LATEST};
pub use registry::{ArtifactInfo, CategoryCount, ListRequest, PublishRequest, Registry};
pub use store::{MemoryStore, RegistryStore, SqliteStore, StoreBackend};
pub use version::VersionPolicy;
