//! Core error types.

/// Errors raised by the pure domain helpers in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Payload exceeds the configured size limit.
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// A digest string could not be parsed.
    #[error("invalid digest '{value}': {detail}")]
    InvalidDigest { value: String, detail: String },

    /// An agent spec document is structurally invalid.
    #[error("invalid agent spec: {detail}")]
    InvalidSpec { detail: String },

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
