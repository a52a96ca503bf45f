//! Error types for the delta registry

use thiserror::Error;

use crate::delta::VersionId;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Delta registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unknown version {version} for subject {subject}")]
    UnknownVersion { subject: String, version: VersionId },

    #[error("delta {from} -> {to} is already registered")]
    DuplicateEdge { from: VersionId, to: VersionId },

    #[error("registering delta {from} -> {to} would create a cycle")]
    Cycle { from: VersionId, to: VersionId },

    #[error("no transformation path from {from} to {to} for subject {subject}")]
    NoPath {
        subject: String,
        from: VersionId,
        to: VersionId,
    },

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("transformation of field {field} failed in delta {from} -> {to}: {message}")]
    Transformation {
        from: VersionId,
        to: VersionId,
        field: String,
        message: String,
    },

    #[error("transformation rule for field {field} exceeded the evaluation budget of {budget} steps")]
    TransformationTimeout { field: String, budget: u64 },

    #[error("transformation cancelled before delta {from} -> {to}")]
    Cancelled { from: VersionId, to: VersionId },

    /// Internal invariant violation. Never swallowed; surfaced for operator attention.
    #[error("cache inconsistency: {0}")]
    CacheInconsistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
