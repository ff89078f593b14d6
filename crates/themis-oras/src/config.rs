//! Configuration for the ORAS referrer store.

use crate::auth::AuthProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_name() -> String {
    crate::store::STORE_NAME.to_string()
}

/// Configuration consumed by the store factory.
///
/// Deserialized from the `stores` section of the service configuration:
///
/// ```json
/// {
///     "name": "oras",
///     "useHttp": false,
///     "cosignEnabled": true,
///     "authProvider": { "name": "dockerConfig" },
///     "localCachePath": "/var/cache/themis/oras"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrasStoreConfig {
    /// Store backend name; must be `"oras"`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Use plain HTTP instead of HTTPS for registry requests.
    #[serde(default)]
    pub use_http: bool,

    /// Also look up cosign legacy signature tags when listing referrers.
    #[serde(default)]
    pub cosign_enabled: bool,

    /// Auth provider selection and settings.
    #[serde(default)]
    pub auth_provider: AuthProviderConfig,

    /// Root of the local content cache. Defaults to
    /// `<home>/.config/themis/local_oras_cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_cache_path: Option<PathBuf>,

    /// Registry hosts whose TLS certificates are not verified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insecure_registries: Vec<String>,
}

impl Default for OrasStoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            use_http: false,
            cosign_enabled: false,
            auth_provider: AuthProviderConfig::default(),
            local_cache_path: None,
            insecure_registries: Vec::new(),
        }
    }
}

impl OrasStoreConfig {
    /// The effective content cache root.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.local_cache_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("themis")
                .join("local_oras_cache")
        })
    }

    /// Whether TLS verification is disabled for `registry_host`.
    #[must_use]
    pub fn is_insecure(&self, registry_host: &str) -> bool {
        self.insecure_registries
            .iter()
            .any(|host| host == registry_host)
    }
}
