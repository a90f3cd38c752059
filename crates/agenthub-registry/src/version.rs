//! Version-string policy.
//!
//! The ledger treats version strings as opaque: any non-empty string is a
//! valid version, unique per artifact. Deployments that want Cargo-style
//! versions turn on `require_semver`, which checks the shape with the
//! `semver` crate before the ledger is reached. Ordering is never derived
//! from the string; "latest" is always the most recent publish.

use serde::{Deserialize, Serialize};

use crate::config::PublishConfig;
use crate::error::{RegistryError, Result};

/// A parsed semantic version.
pub type SemVer = semver::Version;

/// Parse a version string like "1.2.3".
pub fn parse_semver(s: &str) -> std::result::Result<SemVer, semver::Error> {
    SemVer::parse(s)
}

/// Checks applied to a version string before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionPolicy {
    pub require_semver: bool,
}

impl VersionPolicy {
    /// Create a policy, optionally requiring semantic versions.
    pub fn new(require_semver: bool) -> Self {
        VersionPolicy { require_semver }
    }

    /// Policy for a publish configuration.
    pub fn from_config(config: &PublishConfig) -> Self {
        VersionPolicy::new(config.require_semver)
    }

    /// Validate `version`.
    pub fn check(&self, version: &str) -> Result<()> {
        if version.is_empty() {
            return Err(RegistryError::invalid("version must not be empty"));
        }
        if self.require_semver {
            parse_semver(version).map_err(|e| {
                RegistryError::invalid(format!("version '{version}' is not a semantic version: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_policy_accepts_any_non_empty() {
        let policy = VersionPolicy::default();
        for v in ["1.0.0", "v2", "2024-06-01", "nightly"] {
            assert!(policy.check(v).is_ok(), "{v}");
        }
        assert!(policy.check("").is_err());
    }

    #[test]
    fn semver_policy() {
        let policy = VersionPolicy::new(true);
        assert!(policy.check("1.2.3").is_ok());
        assert!(policy.check("1.0.0-beta.1+build.5").is_ok());
        assert!(matches!(
            policy.check("v1"),
            Err(RegistryError::InvalidArgument { .. })
        ));
        assert!(policy.check("1.2").is_err());
    }

    #[test]
    fn semver_ordering_is_not_publish_order() {
        let older = parse_semver("1.10.0").unwrap();
        let newer = parse_semver("1.9.0").unwrap();
        assert!(older > newer);
    }

    #[test]
    fn from_config() {
        let config = PublishConfig {
            require_semver: true,
            validate_spec: false,
            namespaces: Default::default(),
        };
        assert!(VersionPolicy::from_config(&config).require_semver);
    }
}
