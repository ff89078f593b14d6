//! The referrer store contract.
//!
//! A referrer store resolves image references against a registry backend
//! and enumerates the artifacts referring to them. Verifiers depend only
//! on this trait; backends live in their own crates.

use crate::descriptor::{ReferenceDescriptor, SubjectDescriptor};
use crate::error::CoreError;
use crate::manifest::ReferenceManifest;
use crate::reference::Reference;
use async_trait::async_trait;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by referrer store operations.
///
/// The store is a library: it never retries. Callers own retry policy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad configuration at construction time; fatal to the store.
    #[error("Store configuration error: {reason}")]
    Config {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A registry or network failure. Observing this error for a
    /// reference evicts its repository client cache entry.
    #[error("Registry error for '{reference}'{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Registry {
        /// The reference the operation was acting on.
        reference: String,
        /// HTTP status when the registry answered, `None` for transport
        /// failures.
        status: Option<u16>,
        /// Failure detail.
        message: String,
    },

    /// A fetched manifest body could not be decoded. Fatal to the call,
    /// never retried.
    #[error("Failed to parse manifest for '{reference}': {reason}")]
    ManifestParse {
        /// The reference the manifest was fetched for.
        reference: String,
        /// Decode failure detail.
        reason: String,
    },

    /// Local content cache I/O failure.
    #[error("Content cache error: {reason}")]
    Cache {
        /// Failure detail.
        reason: String,
    },

    /// A core type failed to parse or verify.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// One page of referrer results.
///
/// Backends drive registry pagination internally; `next_token` is
/// reserved for callers that page at a coarser granularity and is `None`
/// when the listing is complete.
#[derive(Debug, Clone, Default)]
pub struct ListReferrersResult {
    /// Referrer descriptors, registry order, cosign fallback entries
    /// appended after native referrers.
    pub referrers: Vec<ReferenceDescriptor>,

    /// Continuation token for a subsequent call, when the listing was
    /// truncated.
    pub next_token: Option<String>,
}

/// Contract implemented by referrer store backends.
///
/// Implementations are shared across concurrent admission requests and
/// must be safe for concurrent use. All remote operations are cancelled
/// by dropping the returned future.
#[async_trait]
pub trait ReferrerStore: Send + Sync {
    /// The backend name, used to select the store from configuration.
    fn name(&self) -> &str;

    /// The raw configuration the store was constructed from.
    fn config(&self) -> &serde_json::Value;

    /// Lists artifacts referring to `subject`.
    ///
    /// Resolves the subject descriptor first when `subject_desc` is not
    /// supplied. `artifact_types` is a hint forwarded to the registry;
    /// implementations remain correct when the registry ignores it.
    async fn list_referrers(
        &self,
        subject: &Reference,
        artifact_types: &[String],
        next_token: Option<&str>,
        subject_desc: Option<&SubjectDescriptor>,
    ) -> Result<ListReferrersResult>;

    /// Resolves `subject` to its descriptor. Authoritative for the
    /// digest of a mutable tag.
    async fn get_subject_descriptor(&self, subject: &Reference) -> Result<SubjectDescriptor>;

    /// Fetches and decodes the manifest of a referrer.
    async fn get_reference_manifest(
        &self,
        subject: &Reference,
        referrer: &ReferenceDescriptor,
    ) -> Result<ReferenceManifest>;

    /// Fetches blob content by digest from the subject's repository.
    /// Returned bytes always hash to `digest`.
    async fn get_blob_content(&self, subject: &Reference, digest: &str) -> Result<Vec<u8>>;
}
