//! Content-addressed local cache of manifests and blobs.
//!
//! The cache is an OCI image layout directory:
//!
//! ```text
//! <root>/
//! ├── oci-layout            (layout version marker)
//! ├── index.json            (empty image index)
//! └── blobs/
//!     └── sha256/
//!         └── <hex>         (one file per cached blob)
//! ```
//!
//! The cache is an accelerator, not a source of truth: entries live for
//! the lifetime of the directory and expiry is the deployment's concern.
//! Writes are atomic per blob (temp file + rename), so a cancelled fetch
//! never leaves a partial entry observable.

use std::io::Write as _;
use std::path::PathBuf;
use themis_core::descriptor::Descriptor;
use themis_core::{digest, CoreError, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

const LAYOUT_MARKER_FILE: &str = "oci-layout";
const LAYOUT_MARKER_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const INDEX_FILE: &str = "index.json";
const INDEX_CONTENT: &str = r#"{"schemaVersion":2,"manifests":[]}"#;

/// Errors produced by the content cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Content for this digest is already cached. Pushes are
    /// write-if-absent; callers treat this as success.
    #[error("Content already exists in cache: {digest}")]
    AlreadyExists {
        /// Digest of the duplicate content.
        digest: String,
    },

    /// No content cached under this digest.
    #[error("Content not found in cache: {digest}")]
    NotFound {
        /// The missing digest.
        digest: String,
    },

    /// The digest is malformed, uses an unverifiable algorithm, or the
    /// content does not hash to it.
    #[error(transparent)]
    Digest(#[from] CoreError),

    /// Filesystem failure.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn into_store(self) -> StoreError {
        match self {
            Self::Digest(e) => StoreError::Core(e),
            other => StoreError::Cache {
                reason: other.to_string(),
            },
        }
    }
}

/// A content-addressed store rooted at an OCI image layout directory.
#[derive(Debug)]
pub struct OciLayoutCache {
    root: PathBuf,
}

impl OciLayoutCache {
    /// Opens (creating if needed) the layout directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the directory or its marker files
    /// cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let io_error = |path: PathBuf| move |source| CacheError::Io { path, source };

        let blobs = root.join("blobs");
        std::fs::create_dir_all(&blobs).map_err(io_error(blobs))?;

        for (file, content) in [
            (LAYOUT_MARKER_FILE, LAYOUT_MARKER_CONTENT),
            (INDEX_FILE, INDEX_CONTENT),
        ] {
            let path = root.join(file);
            if !path.exists() {
                std::fs::write(&path, content).map_err(io_error(path))?;
            }
        }

        Ok(Self { root })
    }

    /// The layout root directory.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn blob_path(&self, digest_str: &str) -> Result<PathBuf, CacheError> {
        let (algorithm, encoded) = digest::split(digest_str)?;
        Ok(self.root.join("blobs").join(algorithm).join(encoded))
    }

    /// Whether content for this descriptor's digest is cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Digest`] for malformed digests.
    pub fn exists(&self, descriptor: &Descriptor) -> Result<bool, CacheError> {
        Ok(self.blob_path(&descriptor.digest)?.exists())
    }

    /// Writes content for `descriptor`, if absent.
    ///
    /// The bytes are verified against the descriptor digest before
    /// anything becomes visible, and committed with an atomic rename.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyExists`] for duplicate pushes (a
    /// non-fatal sentinel), [`CacheError::Digest`] when the content does
    /// not match, and [`CacheError::Io`] on filesystem failure.
    pub fn push(&self, descriptor: &Descriptor, bytes: &[u8]) -> Result<(), CacheError> {
        let (algorithm, encoded) = digest::split(&descriptor.digest)?;
        let parent = self.root.join("blobs").join(algorithm);
        let path = parent.join(encoded);
        if path.exists() {
            return Err(CacheError::AlreadyExists {
                digest: descriptor.digest.clone(),
            });
        }

        digest::verify(bytes, &descriptor.digest)?;
        std::fs::create_dir_all(&parent).map_err(|source| CacheError::Io {
            path: parent.clone(),
            source,
        })?;

        let mut temp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|source| CacheError::Io {
                path: parent.clone(),
                source,
            })?;
        temp.write_all(bytes).map_err(|source| CacheError::Io {
            path: temp.path().to_path_buf(),
            source,
        })?;
        temp.persist(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(digest = %descriptor.digest, size = bytes.len(), "Cached content");
        Ok(())
    }

    /// Reads content for `descriptor`, verifying it hashes to the
    /// descriptor digest.
    ///
    /// A corrupt entry is removed so the next call refetches from the
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] when absent, [`CacheError::Digest`]
    /// on verification failure, and [`CacheError::Io`] on read failure.
    pub fn fetch(&self, descriptor: &Descriptor) -> Result<Vec<u8>, CacheError> {
        let path = self.blob_path(&descriptor.digest)?;

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    digest: descriptor.digest.clone(),
                })
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        if let Err(e) = digest::verify(&bytes, &descriptor.digest) {
            warn!(digest = %descriptor.digest, "Removing corrupt cache entry");
            let _ = std::fs::remove_file(&path);
            return Err(CacheError::Digest(e));
        }

        Ok(bytes)
    }
}
