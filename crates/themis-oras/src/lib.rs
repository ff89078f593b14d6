//! # Themis ORAS Store
//!
//! OCI registry referrer store backend for the Themis admission-time
//! artifact verification service.
//!
//! The store resolves image references to subject descriptors and
//! enumerates the artifacts (signatures, SBOMs, attestations) that refer
//! to them through the OCI Distribution Referrers API, with a cosign
//! tag-based fallback for legacy signature discovery. Fetched manifests
//! and blobs are memoized in a local content-addressed cache laid out as
//! an OCI image layout directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use themis_core::{Reference, ReferrerStore};
//! use themis_oras::{OrasStore, OrasStoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = OrasStore::new(OrasStoreConfig::default())?;
//!
//!     let subject: Reference = "registry.example.com/app/web:v1.4.2".parse()?;
//!     let result = store.list_referrers(&subject, &[], None, None).await?;
//!
//!     for referrer in result.referrers {
//!         println!("{} {}", referrer.artifact_type, referrer.descriptor.digest);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod auth;
mod client;
mod client_cache;
pub mod config;
pub mod content_cache;
mod cosign;
mod store;
mod transport;

pub use auth::{AuthCredential, AuthError, AuthProvider, AuthProviderConfig};
pub use config::OrasStoreConfig;
pub use content_cache::{CacheError, OciLayoutCache};
pub use store::{create_store, OrasStore, STORE_NAME};
