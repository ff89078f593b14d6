//! Image reference parsing.
//!
//! A reference names content in a registry:
//! `registry.example.com/app/web:v1.4.2` or
//! `registry.example.com/app/web@sha256:...`. Admission requests arrive
//! fully qualified, so the first path component must be a registry host
//! (contains `.` or `:`, or is `localhost`); no default registry is
//! applied. The original string, exactly as received, is the canonical
//! cache key.

use crate::digest;
use crate::error::CoreError;
use std::str::FromStr;

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    original: String,
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parses a reference of the form `registry/path[:tag][@digest]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReference`] when the registry host or
    /// repository path is missing, or when the digest is malformed.
    pub fn parse(original: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidReference {
            reference: original.to_string(),
            reason: reason.to_string(),
        };

        let (remainder, parsed_digest) = match original.rsplit_once('@') {
            Some((remainder, digest_part)) => {
                digest::validate(digest_part).map_err(|e| CoreError::InvalidReference {
                    reference: original.to_string(),
                    reason: e.to_string(),
                })?;
                (remainder, Some(digest_part.to_string()))
            }
            None => (original, None),
        };

        // A ':' after the last '/' separates the tag; a ':' before it is
        // a registry port.
        let (remainder, tag) = match remainder.rsplit_once(':') {
            Some((head, tail)) if !tail.contains('/') => (head, Some(tail.to_string())),
            _ => (remainder, None),
        };

        let (registry, repository) = remainder
            .split_once('/')
            .ok_or_else(|| invalid("missing repository path"))?;

        if !(registry.contains('.') || registry.contains(':') || registry == "localhost") {
            return Err(invalid("missing registry host"));
        }

        if repository.is_empty() {
            return Err(invalid("empty repository path"));
        }

        if tag.is_none() && parsed_digest.is_none() {
            return Err(invalid("reference must carry a tag or a digest"));
        }

        Ok(Self {
            original: original.to_string(),
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag,
            digest: parsed_digest,
        })
    }

    /// The reference string exactly as received. This is the canonical
    /// cache key for per-reference state.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The registry host, possibly with a port.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The repository path within the registry.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The tag, if the reference carries one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest, if the reference carries one. A digest takes
    /// precedence over a tag when resolving.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The tag or digest used to address the manifest: the digest when
    /// present, otherwise the tag.
    #[must_use]
    pub fn manifest_selector(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(&self.original)
    }
}

impl FromStr for Reference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_tag_reference() {
        let reference = Reference::parse("registry.example.com/app/web:v1.4.2").unwrap();
        assert_eq!(reference.registry(), "registry.example.com");
        assert_eq!(reference.repository(), "app/web");
        assert_eq!(reference.tag(), Some("v1.4.2"));
        assert_eq!(reference.digest(), None);
        assert_eq!(reference.manifest_selector(), "v1.4.2");
    }

    #[test]
    fn test_parse_digest_reference() {
        let original = format!("registry.example.com/app/web@{DIGEST}");
        let reference = Reference::parse(&original).unwrap();
        assert_eq!(reference.tag(), None);
        assert_eq!(reference.digest(), Some(DIGEST));
        assert_eq!(reference.manifest_selector(), DIGEST);
        assert_eq!(reference.original(), original);
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let original = format!("registry.example.com/app/web:v1@{DIGEST}");
        let reference = Reference::parse(&original).unwrap();
        assert_eq!(reference.tag(), Some("v1"));
        assert_eq!(reference.digest(), Some(DIGEST));
        // Digest wins over the tag.
        assert_eq!(reference.manifest_selector(), DIGEST);
    }

    #[test]
    fn test_parse_registry_with_port() {
        let reference = Reference::parse("localhost:5000/app:latest").unwrap();
        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.repository(), "app");
        assert_eq!(reference.tag(), Some("latest"));
    }

    #[test]
    fn test_parse_localhost_without_port() {
        let reference = Reference::parse("localhost/app:latest").unwrap();
        assert_eq!(reference.registry(), "localhost");
    }

    #[test]
    fn test_parse_rejects_unqualified() {
        assert!(Reference::parse("app/web:v1").is_err());
        assert!(Reference::parse("web:v1").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_selector() {
        assert!(Reference::parse("registry.example.com/app/web").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_digest() {
        assert!(Reference::parse("registry.example.com/app@sha256:xyz").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let original = "registry.example.com/app/web:v1.4.2";
        let reference: Reference = original.parse().unwrap();
        assert_eq!(reference.to_string(), original);
    }
}
