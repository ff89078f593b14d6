//! The ORAS referrer store façade.
//!
//! Wires the auth provider, transport pair, content cache, repository
//! client cache and protocol driver into the [`ReferrerStore`] contract.
//!
//! Every operation follows the same discipline: acquire a repository
//! client (cached when its credentials are still live, freshly built
//! otherwise), perform the registry work, then install the client in the
//! cache on success or evict the reference on any registry error. A
//! client is only ever cached after the registry has accepted it.

use crate::auth::{create_auth_provider, AuthCredential, AuthProvider};
use crate::client::RepositoryClient;
use crate::client_cache::{ClientEntry, RepositoryClientCache};
use crate::config::OrasStoreConfig;
use crate::content_cache::{CacheError, OciLayoutCache};
use crate::cosign;
use crate::transport::TransportPair;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use themis_core::descriptor::{Descriptor, MediaType, ReferenceDescriptor, SubjectDescriptor};
use themis_core::manifest::ReferenceManifest;
use themis_core::store::{ListReferrersResult, Result};
use themis_core::{digest, Reference, ReferrerStore, StoreError};
use tracing::{debug, info, warn};

/// Name under which this backend registers.
pub const STORE_NAME: &str = "oras";

/// Referrer store backed by OCI registries, with a local OCI-layout
/// content cache.
#[derive(Debug)]
pub struct OrasStore {
    config: OrasStoreConfig,
    raw_config: serde_json::Value,
    auth_provider: Box<dyn AuthProvider>,
    transports: TransportPair,
    content_cache: OciLayoutCache,
    client_cache: RepositoryClientCache,
}

/// Builds a store from a raw configuration value, dispatching on its
/// `name` field. Only the `"oras"` backend is built in.
///
/// # Errors
///
/// Returns [`StoreError::Config`] for unknown store names or invalid
/// configuration.
pub fn create_store(raw_config: &serde_json::Value) -> Result<Arc<dyn ReferrerStore>> {
    let name = raw_config
        .get("name")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| StoreError::Config {
            reason: "store configuration is missing 'name'".to_string(),
        })?;

    match name {
        STORE_NAME => Ok(Arc::new(OrasStore::from_value(raw_config)?)),
        other => Err(StoreError::Config {
            reason: format!("unknown referrer store '{other}'"),
        }),
    }
}

impl OrasStore {
    /// Creates a store from parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the auth provider cannot be
    /// built, the local cache directory cannot be created, or the HTTP
    /// transports cannot be constructed.
    pub fn new(config: OrasStoreConfig) -> Result<Self> {
        let raw_config = serde_json::to_value(&config).map_err(|e| StoreError::Config {
            reason: format!("failed to serialize store configuration: {e}"),
        })?;
        Self::with_raw_config(config, raw_config)
    }

    /// Creates a store from a raw configuration value, preserving it for
    /// [`ReferrerStore::config`].
    ///
    /// # Errors
    ///
    /// As for [`OrasStore::new`], plus deserialization failures.
    pub fn from_value(raw_config: &serde_json::Value) -> Result<Self> {
        let config: OrasStoreConfig =
            serde_json::from_value(raw_config.clone()).map_err(|e| StoreError::Config {
                reason: format!("failed to parse oras store configuration: {e}"),
            })?;
        Self::with_raw_config(config, raw_config.clone())
    }

    fn with_raw_config(config: OrasStoreConfig, raw_config: serde_json::Value) -> Result<Self> {
        if config.name != STORE_NAME {
            return Err(StoreError::Config {
                reason: format!("expected store name '{STORE_NAME}', got '{}'", config.name),
            });
        }

        let auth_provider =
            create_auth_provider(&config.auth_provider).map_err(|e| StoreError::Config {
                reason: format!("failed to create auth provider: {e}"),
            })?;

        let cache_path = config.cache_path();
        let content_cache = OciLayoutCache::new(&cache_path).map_err(|e| StoreError::Config {
            reason: format!(
                "could not create local oras cache at {}: {e}",
                cache_path.display()
            ),
        })?;

        info!(cache = %cache_path.display(), cosign = config.cosign_enabled, "Created oras referrer store");

        Ok(Self {
            config,
            raw_config,
            auth_provider,
            transports: TransportPair::new()?,
            content_cache,
            client_cache: RepositoryClientCache::new(),
        })
    }

    /// Whether a live repository client is cached for the reference
    /// string. Intended for diagnostics and tests.
    pub async fn has_cached_client(&self, reference: &str) -> bool {
        self.client_cache.get(reference).await.is_some()
    }

    /// Returns a repository client for `subject`: the cached one when
    /// its credentials are live, otherwise a freshly built client that
    /// is *not* yet cached. Callers install it with [`Self::commit`]
    /// after the registry accepts it.
    async fn repository_client(
        &self,
        subject: &Reference,
    ) -> Result<(Arc<RepositoryClient>, Option<DateTime<Utc>>)> {
        if !self.auth_provider.enabled() {
            return Err(StoreError::Config {
                reason: "auth provider is not enabled".to_string(),
            });
        }

        if let Some(entry) = self.client_cache.get(subject.original()).await {
            return Ok((entry.client, entry.expires_on));
        }

        let credential = match self.auth_provider.provide(subject.registry()).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    registry = subject.registry(),
                    error = %e,
                    "Auth provider failed, attempting anonymous credentials"
                );
                AuthCredential::default()
            }
        };
        let expires_on = credential.expires_on;

        let transport = self
            .transports
            .select(self.config.is_insecure(subject.registry()));
        let client = RepositoryClient::new(
            subject.clone(),
            credential,
            transport.clone(),
            self.config.use_http,
        );

        Ok((Arc::new(client), expires_on))
    }

    /// Installs the client for `subject` after a successful registry
    /// interaction. Insert-if-absent: a concurrent winner stays.
    async fn commit(
        &self,
        subject: &Reference,
        client: Arc<RepositoryClient>,
        expires_on: Option<DateTime<Utc>>,
    ) {
        self.client_cache
            .add(subject.original(), ClientEntry { client, expires_on })
            .await;
    }

    async fn evict(&self, subject: &Reference) {
        self.client_cache.evict(subject.original()).await;
    }

    /// Cache-then-fetch for content addressed by `descriptor`. The
    /// remote fetch is supplied by the caller; a duplicate cache push is
    /// success, any other push failure is surfaced.
    async fn cached_content(
        &self,
        subject: &Reference,
        client: &Arc<RepositoryClient>,
        expires_on: Option<DateTime<Utc>>,
        descriptor: &Descriptor,
        fetched: Option<(Descriptor, Vec<u8>)>,
    ) -> Result<Vec<u8>> {
        if let Some((observed, bytes)) = fetched {
            match self.content_cache.push(&observed, &bytes) {
                Ok(()) => {}
                Err(CacheError::AlreadyExists { digest }) => {
                    debug!(%digest, "Content already cached");
                }
                Err(e) => return Err(e.into_store()),
            }
            self.commit(subject, Arc::clone(client), expires_on).await;
        }

        self.content_cache
            .fetch(descriptor)
            .map_err(CacheError::into_store)
    }
}

#[async_trait]
impl ReferrerStore for OrasStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn config(&self) -> &serde_json::Value {
        &self.raw_config
    }

    async fn list_referrers(
        &self,
        subject: &Reference,
        artifact_types: &[String],
        _next_token: Option<&str>,
        subject_desc: Option<&SubjectDescriptor>,
    ) -> Result<ListReferrersResult> {
        let (client, expires_on) = self.repository_client(subject).await?;

        let resolved = match subject_desc {
            Some(descriptor) => descriptor.clone(),
            None => self.get_subject_descriptor(subject).await?,
        };

        let artifact_type_filter = artifact_types.first().map(String::as_str);
        let native = match client.referrers(resolved.digest(), artifact_type_filter).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                self.evict(subject).await;
                return Err(e);
            }
        };
        self.commit(subject, Arc::clone(&client), expires_on).await;

        let mut referrers: Vec<ReferenceDescriptor> =
            native.into_iter().map(ReferenceDescriptor::from).collect();

        if self.config.cosign_enabled {
            referrers.extend(cosign::cosign_referrers(&client, resolved.digest()).await?);
        }

        debug!(
            subject = subject.original(),
            count = referrers.len(),
            "Listed referrers"
        );

        Ok(ListReferrersResult {
            referrers,
            next_token: None,
        })
    }

    async fn get_subject_descriptor(&self, subject: &Reference) -> Result<SubjectDescriptor> {
        let (client, expires_on) = self.repository_client(subject).await?;

        match client.resolve(subject.manifest_selector()).await {
            Ok(descriptor) => {
                self.commit(subject, client, expires_on).await;
                Ok(SubjectDescriptor::new(descriptor))
            }
            Err(e) => {
                self.evict(subject).await;
                Err(e)
            }
        }
    }

    async fn get_reference_manifest(
        &self,
        subject: &Reference,
        referrer: &ReferenceDescriptor,
    ) -> Result<ReferenceManifest> {
        let (client, expires_on) = self.repository_client(subject).await?;
        let descriptor = &referrer.descriptor;

        let cached = self
            .content_cache
            .exists(descriptor)
            .map_err(CacheError::into_store)?;

        let fetched = if cached {
            None
        } else {
            match client.fetch_manifest(&descriptor.digest).await {
                Ok(bytes) => Some((descriptor.clone(), bytes)),
                Err(e) => {
                    self.evict(subject).await;
                    return Err(e);
                }
            }
        };

        let bytes = self
            .cached_content(subject, &client, expires_on, descriptor, fetched)
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| StoreError::ManifestParse {
            reference: subject.original().to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_blob_content(&self, subject: &Reference, digest_str: &str) -> Result<Vec<u8>> {
        let (client, expires_on) = self.repository_client(subject).await?;

        digest::validate(digest_str)?;
        // Probe descriptor: the true size is unknown until the registry
        // answers, and the cache keys on digest alone.
        let probe = Descriptor::new(
            MediaType::new("application/octet-stream"),
            digest_str,
            0,
        );

        let cached = self
            .content_cache
            .exists(&probe)
            .map_err(CacheError::into_store)?;

        let fetched = if cached {
            None
        } else {
            match client.fetch_blob(digest_str).await {
                Ok((observed, bytes)) => Some((observed, bytes)),
                Err(e) => {
                    self.evict(subject).await;
                    return Err(e);
                }
            }
        };

        self.cached_content(subject, &client, expires_on, &probe, fetched)
            .await
    }
}
