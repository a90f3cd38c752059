//! Artifact references and their resolution.
//!
//! Grammar:
//!
//! ```text
//! reference = [ namespace "/" ] name [ "@" selector ]
//! selector  = "latest" | version-string
//! ```
//!
//! Surrounding whitespace is trimmed and the first `@` separates the
//! selector; names never contain `@`, so a version string may. A missing namespace means the configured default namespace; a
//! missing selector means `latest`. No case folding is applied. The default
//! namespace and the `latest` keyword are part of the public contract.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use agenthub_core::{Artifact, Caller, Version};

use crate::catalog::{validate_identity_part, Catalog};
use crate::error::{RegistryError, Result};
use crate::ledger::Ledger;

/// Namespace used when a reference omits one and nothing else is configured.
pub const DEFAULT_NAMESPACE: &str = "agenthub";

/// Selector keyword for the latest version.
pub const LATEST: &str = "latest";

/// Which version a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    Latest,
    Exact(String),
}

impl VersionSelector {
    pub fn as_str(&self) -> &str {
        match self {
            VersionSelector::Latest => LATEST,
            VersionSelector::Exact(v) => v,
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub namespace: String,
    pub name: String,
    pub selector: VersionSelector,
}

impl Reference {
    /// Parse `input`, filling a missing namespace with `default_namespace`.
    pub fn parse(input: &str, default_namespace: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RegistryError::invalid("reference must not be empty"));
        }

        let (path, selector) = match input.split_once('@') {
            Some((path, selector)) => {
                if selector.is_empty() {
                    return Err(RegistryError::invalid(format!(
                        "reference '{input}' has an empty version selector"
                    )));
                }
                (path, selector)
            }
            None => (input, LATEST),
        };

        let mut parts = path.split('/');
        let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, _) => (default_namespace, name),
            (Some(namespace), Some(name), None) => (namespace, name),
            _ => {
                return Err(RegistryError::invalid(format!(
                    "reference '{input}' has more than one '/'"
                )))
            }
        };
        validate_identity_part("namespace", namespace)?;
        validate_identity_part("name", name)?;

        let selector = if selector == LATEST {
            VersionSelector::Latest
        } else {
            VersionSelector::Exact(selector.to_string())
        };

        Ok(Reference {
            namespace: namespace.to_string(),
            name: name.to_string(),
            selector,
        })
    }

    /// `namespace/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.selector)
    }
}

/// A resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub artifact: Artifact,
    pub version: Version,
}

/// Turns references into `(artifact, version)` pairs.
#[derive(Clone)]
pub struct Resolver {
    catalog: Catalog,
    ledger: Ledger,
    default_namespace: String,
}

impl Resolver {
    /// Create a resolver filling missing namespaces with
    /// `default_namespace`.
    pub fn new(catalog: Catalog, ledger: Ledger, default_namespace: impl Into<String>) -> Self {
        Resolver {
            catalog,
            ledger,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Parse with this resolver's default namespace.
    pub fn parse(&self, input: &str) -> Result<Reference> {
        Reference::parse(input, &self.default_namespace)
    }

    /// Resolve a parsed reference for `caller`. Read-only.
    pub fn resolve(&self, reference: &Reference, caller: &Caller) -> Result<Resolved> {
        let artifact = self
            .catalog
            .get_artifact(&reference.namespace, &reference.name, caller)?;
        let version = match &reference.selector {
            VersionSelector::Latest => self.ledger.get_latest_version(&artifact)?,
            VersionSelector::Exact(v) => self.ledger.get_version(&artifact, v)?,
        };
        debug!(
            reference = %reference,
            version = %version.version,
            digest = %version.digest,
            "resolved reference"
        );
        Ok(Resolved { artifact, version })
    }

    /// Parse and resolve.
    pub fn resolve_str(&self, input: &str, caller: &Caller) -> Result<Resolved> {
        let reference = self.parse(input)?;
        self.resolve(&reference, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Reference> {
        Reference::parse(input, DEFAULT_NAMESPACE)
    }

    fn exact(v: &str) -> VersionSelector {
        VersionSelector::Exact(v.to_string())
    }

    #[test]
    fn full_reference() {
        let r = parse("alice/bot@1.0.0").unwrap();
        assert_eq!(r.namespace, "alice");
        assert_eq!(r.name, "bot");
        assert_eq!(r.selector, exact("1.0.0"));
        assert_eq!(r.to_string(), "alice/bot@1.0.0");
    }

    #[test]
    fn defaults_fill_missing_parts() {
        let r = parse("bot").unwrap();
        assert_eq!(r.namespace, "agenthub");
        assert_eq!(r.selector, VersionSelector::Latest);
        assert_eq!(r.to_string(), "agenthub/bot@latest");

        let r = Reference::parse("bot@2", "team").unwrap();
        assert_eq!(r.namespace, "team");
        assert_eq!(r.selector, exact("2"));
    }

    #[test]
    fn explicit_latest_keyword() {
        assert_eq!(
            parse("alice/bot@latest").unwrap().selector,
            VersionSelector::Latest
        );
        assert_eq!(parse("alice/bot@Latest").unwrap().selector, exact("Latest"));
    }

    #[test]
    fn whitespace_trimmed_case_kept() {
        let r = parse("  Alice/Bot@1.0.0\n").unwrap();
        assert_eq!(r.namespace, "Alice");
        assert_eq!(r.name, "Bot");
    }

    #[test]
    fn first_at_splits_selector() {
        let r = parse("alice/bot@1.0@beta").unwrap();
        assert_eq!(r.name, "bot");
        assert_eq!(r.selector, exact("1.0@beta"));
        assert_eq!(r.to_string(), "alice/bot@1.0@beta");
        assert_eq!(parse("alice/bot@1.0-rc/1").unwrap().selector, exact("1.0-rc/1"));
    }

    #[test]
    fn published_version_with_at_resolves() {
        use crate::store::{MemoryStore, RegistryStore};
        use agenthub_core::{ArtifactMetadata, PrincipalId};
        use std::sync::Arc;

        let store: Arc<dyn RegistryStore> = Arc::new(MemoryStore::new());
        let catalog = Catalog::new(store.clone());
        let ledger = Ledger::new(store, 1024);
        let owner = PrincipalId::new("u-alice");
        let artifact = catalog
            .create_artifact("alice", "bot", ArtifactMetadata::default(), owner.clone())
            .unwrap();
        ledger
            .publish_version(&artifact, "1.0@beta", b"beta".to_vec(), "", &owner)
            .unwrap();
        ledger
            .publish_version(&artifact, "1.0.0", b"stable".to_vec(), "", &owner)
            .unwrap();

        let resolver = Resolver::new(catalog, ledger, DEFAULT_NAMESPACE);
        let resolved = resolver
            .resolve_str("alice/bot@1.0@beta", &Caller::anonymous())
            .unwrap();
        assert_eq!(resolved.version.version, "1.0@beta");
        assert_eq!(resolved.version.payload, b"beta");
    }

    #[test]
    fn malformed_references() {
        for input in [
            "", "   ", "/bot", "alice/", "alice/bot@", "@1.0", "a/b/c", "a/b/c@1",
        ] {
            assert!(
                matches!(parse(input), Err(RegistryError::InvalidArgument { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for input in ["alice/bot@1.0.0", "agenthub/x@latest", "ns/n@v2-rc.1"] {
            assert_eq!(parse(input).unwrap().to_string(), input);
        }
    }
}
