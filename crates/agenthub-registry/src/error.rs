//! Registry error types.

use agenthub_core::CoreError;

/// Transport-facing classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Malformed reference, empty version string, empty required field.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// No artifact with this identity is visible to the caller.
    #[error("artifact '{artifact}' not found")]
    ArtifactNotFound { artifact: String },

    /// The artifact exists but has no such version.
    #[error("version '{version}' not found for artifact '{artifact}'")]
    VersionNotFound { artifact: String, version: String },

    /// The artifact exists but no version carries the latest flag.
    #[error("artifact '{artifact}' has no latest version")]
    NoLatestVersion { artifact: String },

    /// An artifact with this identity already exists.
    #[error("artifact '{artifact}' already exists")]
    ArtifactExists { artifact: String },

    /// This version string is already published for the artifact.
    #[error("version '{version}' already exists for artifact '{artifact}'")]
    VersionExists { artifact: String, version: String },

    /// The caller may not perform this mutation.
    #[error("permission denied: {action}")]
    Forbidden { action: String },

    /// Payload or spec validation failure from the core model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stored row could not be decoded.
    #[error("corrupt record: {detail}")]
    Corrupt { detail: String },

    /// SQLite store error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        RegistryError::InvalidArgument {
            detail: detail.into(),
        }
    }

    pub(crate) fn forbidden(action: impl Into<String>) -> Self {
        RegistryError::Forbidden {
            action: action.into(),
        }
    }

    /// Classify this error for status mapping in a transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            RegistryError::Core(
                CoreError::PayloadTooLarge { .. }
                | CoreError::InvalidDigest { .. }
                | CoreError::InvalidSpec { .. }
                | CoreError::Yaml(_),
            ) => ErrorKind::InvalidArgument,
            RegistryError::ArtifactNotFound { .. }
            | RegistryError::VersionNotFound { .. }
            | RegistryError::NoLatestVersion { .. } => ErrorKind::NotFound,
            RegistryError::ArtifactExists { .. } | RegistryError::VersionExists { .. } => {
                ErrorKind::Conflict
            }
            RegistryError::Forbidden { .. } => ErrorKind::Forbidden,
            RegistryError::Corrupt { .. }
            | RegistryError::Sqlite(_)
            | RegistryError::Json(_)
            | RegistryError::Config(_)
            | RegistryError::Toml(_)
            | RegistryError::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_name_the_missing_part() {
        let artifact = RegistryError::ArtifactNotFound {
            artifact: "alice/bot".into(),
        };
        let version = RegistryError::VersionNotFound {
            artifact: "alice/bot".into(),
            version: "9.9.9".into(),
        };
        assert_eq!(artifact.to_string(), "artifact 'alice/bot' not found");
        assert_eq!(
            version.to_string(),
            "version '9.9.9' not found for artifact 'alice/bot'"
        );
        assert_eq!(artifact.kind(), ErrorKind::NotFound);
        assert_eq!(version.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn kinds() {
        assert_eq!(
            RegistryError::invalid("empty version").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            RegistryError::forbidden("publish to alice/bot").kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            RegistryError::VersionExists {
                artifact: "a/b".into(),
                version: "1.0.0".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RegistryError::from(CoreError::PayloadTooLarge { size: 2, limit: 1 }).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            RegistryError::Corrupt {
                detail: "bad uuid".into()
            }
            .kind(),
            ErrorKind::Internal
        );
    }
}
