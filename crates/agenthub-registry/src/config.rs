//! Registry configuration.
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Layering for [`RegistryConfig::load`], lowest to highest precedence:
//! built-in defaults, an optional TOML file, then `AGENTHUB__*` environment
//! variables (`__` separates nested keys, e.g. `AGENTHUB__PAGING__MAX_PAGE_SIZE`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use agenthub_core::PrincipalId;

use crate::error::{RegistryError, Result};
use crate::logging::LoggingConfig;
use crate::reference::DEFAULT_NAMESPACE;
use crate::store::StoreBackend;

/// Default upper bound on a single payload: 10 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AGENTHUB";

/// Top-level registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Namespace assumed for references without one.
    pub default_namespace: String,
    /// Largest accepted payload, in bytes.
    pub max_payload_bytes: u64,
    pub paging: PagingConfig,
    pub publish: PublishConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            paging: PagingConfig::default(),
            publish: PublishConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Listing page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        PagingConfig {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Publish-time checks layered over the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Require version strings to be semantic versions.
    pub require_semver: bool,
    /// Require payloads to parse as agent specs.
    pub validate_spec: bool,
    /// Who may create artifacts under a namespace.
    pub namespaces: NamespacePolicy,
}

/// Namespace ownership rule applied when an artifact is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespacePolicy {
    /// Any authenticated principal may create under any namespace.
    #[default]
    Open,
    /// A principal may only create under the namespace equal to its id.
    Principal,
}

impl NamespacePolicy {
    /// Whether `principal` may create artifacts under `namespace`.
    pub fn permits(&self, principal: &PrincipalId, namespace: &str) -> bool {
        match self {
            NamespacePolicy::Open => true,
            NamespacePolicy::Principal => principal.as_str() == namespace,
        }
    }
}

/// Store engine selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    /// Database file for the sqlite backend.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StoreBackend::Memory,
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl RegistryConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: RegistryConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RegistryConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject internally inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.default_namespace.trim().is_empty() || self.default_namespace.contains(['/', '@'])
        {
            return Err(RegistryError::invalid(format!(
                "default_namespace '{}' is not a valid namespace",
                self.default_namespace
            )));
        }
        if self.paging.max_page_size == 0 {
            return Err(RegistryError::invalid("paging.max_page_size must be at least 1"));
        }
        if self.paging.default_page_size == 0
            || self.paging.default_page_size > self.paging.max_page_size
        {
            return Err(RegistryError::invalid(format!(
                "paging.default_page_size must be between 1 and {}",
                self.paging.max_page_size
            )));
        }
        if self.storage.backend == StoreBackend::Sqlite && self.storage.path.is_none() {
            return Err(RegistryError::invalid(
                "storage.path is required for the sqlite backend",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = RegistryConfig::from_toml_str("").unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.default_namespace, "agenthub");
        assert_eq!(config.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.paging.default_page_size, 20);
        assert_eq!(config.paging.max_page_size, 100);
        assert!(!config.publish.require_semver);
        assert_eq!(config.publish.namespaces, NamespacePolicy::Open);
        assert_eq!(config.storage.backend, StoreBackend::Memory);
        assert_eq!(config.storage.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_document() {
        let toml = r#"
default_namespace = "community"
max_payload_bytes = 1024

[paging]
default_page_size = 10
max_page_size = 50

[publish]
require_semver = true
validate_spec = true
namespaces = "principal"

[storage]
backend = "sqlite"
path = "/var/lib/agenthub/registry.db"
busy_timeout_ms = 250

[logging]
level = "debug"
format = "json"
"#;
        let config = RegistryConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.default_namespace, "community");
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.paging.max_page_size, 50);
        assert!(config.publish.require_semver && config.publish.validate_spec);
        assert_eq!(config.publish.namespaces, NamespacePolicy::Principal);
        assert_eq!(config.storage.backend, StoreBackend::Sqlite);
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("/var/lib/agenthub/registry.db"))
        );
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn reject_inconsistent_paging() {
        let err = RegistryConfig::from_toml_str("[paging]\ndefault_page_size = 500\n").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
    }

    #[test]
    fn reject_sqlite_without_path() {
        let err = RegistryConfig::from_toml_str("[storage]\nbackend = \"sqlite\"\n").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
    }

    #[test]
    fn reject_unknown_backend() {
        let err = RegistryConfig::from_toml_str("[storage]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, RegistryError::Toml(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenthub.toml");
        std::fs::write(&path, "default_namespace = \"team\"\n[paging]\nmax_page_size = 40\n")
            .unwrap();
        let config = RegistryConfig::load(Some(&path)).unwrap();
        assert_eq!(config.default_namespace, "team");
        assert_eq!(config.paging.max_page_size, 40);
        assert_eq!(config.paging.default_page_size, 20);
    }
}
