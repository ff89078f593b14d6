//! # Themis Core
//!
//! Core types and contracts for the Themis artifact referrer store.
//!
//! This crate provides the vocabulary shared between referrer store
//! backends and the verifiers that consume them:
//!
//! - [`Reference`] - Parsed image reference (`registry/path:tag` or `@digest`)
//! - [`Descriptor`] - OCI content descriptor
//! - [`ReferenceManifest`] - Decoded manifest of a referrer artifact
//! - [`ReferrerStore`] - Contract implemented by store backends
//! - [`digest`] - Digest computation and verification helpers
//!
//! ## Example
//!
//! ```rust
//! use themis_core::Reference;
//!
//! let reference: Reference = "registry.example.com/app/web:v1.4.2".parse()?;
//! assert_eq!(reference.registry(), "registry.example.com");
//! assert_eq!(reference.repository(), "app/web");
//! assert_eq!(reference.tag(), Some("v1.4.2"));
//! # Ok::<(), themis_core::CoreError>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod reference;
pub mod store;

pub use descriptor::{Descriptor, MediaType, ReferenceDescriptor, SubjectDescriptor};
pub use error::CoreError;
pub use manifest::{ImageIndex, ReferenceManifest};
pub use reference::Reference;
pub use store::{ListReferrersResult, ReferrerStore, StoreError};
