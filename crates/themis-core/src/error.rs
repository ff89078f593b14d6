//! Error types for core operations.

use thiserror::Error;

/// Errors produced while parsing or validating core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Image reference could not be parsed.
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// The offending reference string.
        reference: String,
        /// Why parsing failed.
        reason: String,
    },

    /// Digest string is not of the form `algorithm:hex`.
    #[error("Invalid digest '{digest}': {reason}")]
    InvalidDigest {
        /// The offending digest string.
        digest: String,
        /// Why validation failed.
        reason: String,
    },

    /// Content bytes do not hash to the expected digest.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest the content was addressed by.
        expected: String,
        /// Digest computed from the content.
        actual: String,
    },

    /// Digest algorithm is syntactically valid but not supported for
    /// verification.
    #[error("Unsupported digest algorithm '{algorithm}'")]
    UnsupportedAlgorithm {
        /// The unsupported algorithm name.
        algorithm: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
