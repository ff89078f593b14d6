//! Referrer manifest and image index wire types.

use crate::descriptor::{Descriptor, MediaType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const fn default_schema_version() -> u32 {
    2
}

/// The decoded JSON body of a referrer manifest.
///
/// Accepts both OCI artifact manifests (`blobs`) and image-manifest
/// shaped referrers (`layers`); the blob list is exposed uniformly as
/// [`ReferenceManifest::blobs`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceManifest {
    /// Manifest schema version, 2 for every supported manifest kind.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Media type of the manifest itself.
    pub media_type: MediaType,

    /// Artifact type declared on the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Config descriptor, present on image-manifest shaped referrers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    /// Subject the manifest refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Content blobs carried by the referrer.
    #[serde(default, alias = "layers")]
    pub blobs: Vec<Descriptor>,

    /// Optional key-value annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl ReferenceManifest {
    /// The artifact type of the referrer: the declared `artifactType`,
    /// falling back to the config media type for image-manifest shaped
    /// referrers.
    #[must_use]
    pub fn effective_artifact_type(&self) -> Option<&str> {
        self.artifact_type
            .as_deref()
            .or_else(|| self.config.as_ref().map(|c| c.media_type.as_str()))
    }
}

/// An OCI image index, as returned by the referrers endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Index schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Media type of the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    /// Descriptors listed by the index.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}
