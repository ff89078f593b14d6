//! Digest computation and verification.
//!
//! Digests are strings of the form `algorithm:hex`, e.g.
//! `sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae`.
//! Only `sha256` digests are computed locally; other algorithms are
//! accepted syntactically but cannot be verified.

use crate::error::CoreError;
use sha2::{Digest as _, Sha256};

/// The only digest algorithm this crate computes.
pub const SHA256: &str = "sha256";

/// Computes the `sha256:<hex>` digest of the given bytes.
///
/// # Examples
///
/// ```
/// let digest = themis_core::digest::compute(b"hello");
/// assert!(digest.starts_with("sha256:"));
/// assert_eq!(digest.len(), 7 + 64);
/// ```
#[must_use]
pub fn compute(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{SHA256}:{}", hex::encode(hasher.finalize()))
}

/// Splits a digest into its `(algorithm, hex)` parts, validating the
/// overall shape.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDigest`] if the string is not
/// `algorithm:hex` with a lowercase algorithm and hex payload, or if a
/// `sha256` payload is not exactly 64 hex characters.
pub fn split(digest: &str) -> Result<(&str, &str), CoreError> {
    let (algorithm, encoded) =
        digest
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidDigest {
                digest: digest.to_string(),
                reason: "missing ':' separator".to_string(),
            })?;

    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(CoreError::InvalidDigest {
            digest: digest.to_string(),
            reason: "algorithm must be lowercase alphanumeric".to_string(),
        });
    }

    if encoded.is_empty() || !encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidDigest {
            digest: digest.to_string(),
            reason: "payload must be hex".to_string(),
        });
    }

    if encoded.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(CoreError::InvalidDigest {
            digest: digest.to_string(),
            reason: "payload must be lowercase hex".to_string(),
        });
    }

    if algorithm == SHA256 && encoded.len() != 64 {
        return Err(CoreError::InvalidDigest {
            digest: digest.to_string(),
            reason: format!("sha256 payload must be 64 hex characters, got {}", encoded.len()),
        });
    }

    Ok((algorithm, encoded))
}

/// Validates that a digest string is well formed.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDigest`] on malformed input.
pub fn validate(digest: &str) -> Result<(), CoreError> {
    split(digest).map(|_| ())
}

/// Verifies that `bytes` hash to `expected`.
///
/// # Errors
///
/// Returns [`CoreError::UnsupportedAlgorithm`] for non-sha256 digests and
/// [`CoreError::DigestMismatch`] when the computed digest differs.
pub fn verify(bytes: &[u8], expected: &str) -> Result<(), CoreError> {
    let (algorithm, _) = split(expected)?;
    if algorithm != SHA256 {
        return Err(CoreError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        });
    }

    let actual = compute(bytes);
    if actual != expected {
        return Err(CoreError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    Ok(())
}
