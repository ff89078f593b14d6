//! Cosign legacy signature discovery.
//!
//! Before the Referrers API existed, cosign stored signatures under a
//! tag derived from the subject digest: `sha256-<hex>.sig` in the same
//! repository. When cosign support is enabled the store resolves that
//! tag and, if present, surfaces its descriptor as one more referrer.

use crate::client::RepositoryClient;
use reqwest::StatusCode;
use themis_core::descriptor::{MediaType, ReferenceDescriptor};
use themis_core::{digest, StoreError};
use tracing::debug;

/// Derives the cosign signature tag for a subject digest. Only sha256
/// subjects have a tag form.
#[must_use]
pub fn signature_tag(subject_digest: &str) -> Option<String> {
    let (algorithm, encoded) = digest::split(subject_digest).ok()?;
    if algorithm != digest::SHA256 {
        return None;
    }
    Some(format!("{algorithm}-{encoded}.sig"))
}

/// Looks up the cosign signature tag for `subject_digest`.
///
/// A missing tag contributes no referrers and is not an error; any
/// other registry failure is surfaced.
pub async fn cosign_referrers(
    client: &RepositoryClient,
    subject_digest: &str,
) -> Result<Vec<ReferenceDescriptor>, StoreError> {
    let Some(tag) = signature_tag(subject_digest) else {
        return Ok(Vec::new());
    };

    match client.resolve(&tag).await {
        Ok(descriptor) => {
            debug!(%tag, digest = %descriptor.digest, "Found cosign signature tag");
            Ok(vec![ReferenceDescriptor::new(
                descriptor,
                MediaType::COSIGN_SIGNATURE,
            )])
        }
        Err(StoreError::Registry {
            status: Some(status),
            ..
        }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
