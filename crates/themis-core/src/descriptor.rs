//! OCI content descriptors.
//!
//! Types conforming to the OCI image specification's descriptor model.
//! Descriptor identity is `(digest, size)`; the media type is metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An OCI media type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// OCI artifact manifest media type.
    pub const OCI_ARTIFACT_MANIFEST: &'static str = "application/vnd.oci.artifact.manifest.v1+json";

    /// Docker schema 2 manifest media type.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Artifact type attached to cosign signatures discovered through the
    /// legacy tag convention.
    pub const COSIGN_SIGNATURE: &'static str = "application/vnd.dev.cosign.artifact.sig.v1+json";

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// An OCI content descriptor.
///
/// Describes targeted content by media type, digest and size. Two
/// descriptors are equal when their digests and sizes match; annotations
/// and media type do not participate in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: MediaType,

    /// Digest of the targeted content, `algorithm:hex`.
    pub digest: String,

    /// Size in bytes of the raw content.
    pub size: u64,

    /// Artifact type, meaningful on referrer descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Optional key-value annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    /// Creates a new descriptor with no artifact type or annotations.
    #[must_use]
    pub fn new(media_type: MediaType, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type,
            digest: digest.into(),
            size,
            artifact_type: None,
            annotations: None,
        }
    }

    /// Sets the artifact type.
    #[must_use]
    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.size == other.size
    }
}

impl Eq for Descriptor {}

impl std::hash::Hash for Descriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
        self.size.hash(state);
    }
}

/// The resolved subject of a reference.
///
/// Produced by resolving a tag or digest reference against the registry;
/// authoritative for the subject digest of a mutable tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDescriptor {
    /// The underlying descriptor.
    pub descriptor: Descriptor,
}

impl SubjectDescriptor {
    /// Wraps a descriptor as a resolved subject.
    #[must_use]
    pub const fn new(descriptor: Descriptor) -> Self {
        Self { descriptor }
    }

    /// The subject digest.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.descriptor.digest
    }
}

/// A descriptor enumerated by the referrers listing, carrying the
/// artifact type of the referring manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    /// The underlying descriptor.
    pub descriptor: Descriptor,

    /// Artifact type of the referrer.
    pub artifact_type: String,
}

impl ReferenceDescriptor {
    /// Creates a reference descriptor with an explicit artifact type.
    #[must_use]
    pub fn new(descriptor: Descriptor, artifact_type: impl Into<String>) -> Self {
        Self {
            descriptor,
            artifact_type: artifact_type.into(),
        }
    }
}

impl From<Descriptor> for ReferenceDescriptor {
    /// Promotes a plain descriptor, taking the artifact type from the
    /// descriptor itself and falling back to its media type.
    fn from(descriptor: Descriptor) -> Self {
        let artifact_type = descriptor
            .artifact_type
            .clone()
            .unwrap_or_else(|| descriptor.media_type.as_str().to_string());
        Self {
            descriptor,
            artifact_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(digest: &str, size: u64) -> Descriptor {
        Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), digest, size)
    }

    #[test]
    fn test_descriptor_identity_ignores_media_type() {
        let a = descriptor("sha256:abc", 10);
        let mut b = descriptor("sha256:abc", 10);
        b.media_type = MediaType::new(MediaType::DOCKER_MANIFEST);
        assert_eq!(a, b);
    }

    #[test]
    fn test_descriptor_identity_on_size() {
        let a = descriptor("sha256:abc", 10);
        let b = descriptor("sha256:abc", 11);
        assert_ne!(a, b);
    }

    #[test]
    fn test_descriptor_serde_camel_case() {
        let desc = descriptor("sha256:abc", 42).with_artifact_type("application/spdx+json");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("mediaType"));
        assert!(json.contains("artifactType"));
        assert!(!json.contains("annotations"));
    }

    #[test]
    fn test_reference_descriptor_from_plain() {
        let desc = descriptor("sha256:abc", 42);
        let reference = ReferenceDescriptor::from(desc);
        assert_eq!(reference.artifact_type, MediaType::OCI_MANIFEST);
    }

    #[test]
    fn test_reference_descriptor_prefers_artifact_type() {
        let desc = descriptor("sha256:abc", 42).with_artifact_type("application/spdx+json");
        let reference = ReferenceDescriptor::from(desc);
        assert_eq!(reference.artifact_type, "application/spdx+json");
    }
}
