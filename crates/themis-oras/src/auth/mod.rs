//! Registry credential providers.
//!
//! A provider turns a registry host into a credential for one request.
//! Providers are selected from configuration by a kind tag; each variant
//! contributes only its `provide` semantics. Provider failures are never
//! fatal to a store operation: the store logs a warning and proceeds
//! anonymously, letting the registry's 401/403 become the real error
//! surface.

mod docker_config;

pub use docker_config::DockerConfigProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by credential providers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Provider configuration is invalid.
    #[error("Invalid auth provider configuration: {reason}")]
    Config {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A credential source could not be read.
    #[error("Failed to read credentials from {path}: {source}")]
    Io {
        /// Path of the credential source.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A credential source was read but could not be decoded.
    #[error("Failed to decode credentials: {reason}")]
    Decode {
        /// Decode failure detail.
        reason: String,
    },
}

/// A registry credential.
///
/// The default (all fields empty) is a valid anonymous credential.
/// Credentials are never logged and never written to the content cache;
/// the `Debug` output redacts every secret field.
#[derive(Clone, Default)]
pub struct AuthCredential {
    /// Username for basic authentication.
    pub username: Option<String>,

    /// Password or personal access token.
    pub password: Option<String>,

    /// OAuth2 refresh token, exchanged at the registry's token service.
    pub identity_token: Option<String>,

    /// When the credential stops being valid. `None` means it does not
    /// expire by time.
    pub expires_on: Option<DateTime<Utc>>,
}

impl AuthCredential {
    /// Whether this credential carries no secrets at all.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.identity_token.is_none()
    }
}

impl std::fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "identity_token",
                &self.identity_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Contract implemented by credential providers.
#[async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    /// Whether the provider is usable; gates any `provide` call.
    fn enabled(&self) -> bool;

    /// Produces a credential for `registry_host`. Returning an anonymous
    /// credential is success, meaning "this registry needs no secrets".
    async fn provide(&self, registry_host: &str) -> Result<AuthCredential, AuthError>;
}

/// Tagged auth provider configuration.
///
/// The `name` tag selects the provider kind; the remaining fields are
/// kind specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum AuthProviderConfig {
    /// Read credentials from a Docker `config.json`.
    #[serde(rename_all = "camelCase")]
    DockerConfig {
        /// Explicit path of the config file. Defaults to
        /// `<home>/.docker/config.json`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config_path: Option<PathBuf>,
    },

    /// Fixed credentials applied to every registry.
    #[serde(rename = "static", rename_all = "camelCase")]
    Static {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },
}

impl Default for AuthProviderConfig {
    fn default() -> Self {
        Self::DockerConfig { config_path: None }
    }
}

/// Builds the provider selected by `config`.
///
/// # Errors
///
/// Returns [`AuthError::Config`] when the selected provider rejects its
/// settings.
pub fn create_auth_provider(
    config: &AuthProviderConfig,
) -> Result<Box<dyn AuthProvider>, AuthError> {
    match config {
        AuthProviderConfig::DockerConfig { config_path } => Ok(Box::new(
            DockerConfigProvider::new(config_path.clone()),
        )),
        AuthProviderConfig::Static { username, password } => {
            if username.is_empty() {
                return Err(AuthError::Config {
                    reason: "static auth provider requires a username".to_string(),
                });
            }
            Ok(Box::new(StaticAuthProvider {
                username: username.clone(),
                password: password.clone(),
            }))
        }
    }
}

/// Provider returning the same fixed credentials for every registry.
#[derive(Debug)]
pub struct StaticAuthProvider {
    username: String,
    password: String,
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    fn enabled(&self) -> bool {
        true
    }

    async fn provide(&self, _registry_host: &str) -> Result<AuthCredential, AuthError> {
        Ok(AuthCredential {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            identity_token: None,
            expires_on: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_docker_config() {
        assert!(matches!(
            AuthProviderConfig::default(),
            AuthProviderConfig::DockerConfig { config_path: None }
        ));
    }

    #[test]
    fn test_config_tag_selects_variant() {
        let config: AuthProviderConfig =
            serde_json::from_str(r#"{"name": "dockerConfig", "configPath": "/etc/docker.json"}"#)
                .unwrap();
        assert!(matches!(
            config,
            AuthProviderConfig::DockerConfig { config_path: Some(ref p) }
                if p == &PathBuf::from("/etc/docker.json")
        ));

        let config: AuthProviderConfig =
            serde_json::from_str(r#"{"name": "static", "username": "u", "password": "p"}"#)
                .unwrap();
        assert!(matches!(config, AuthProviderConfig::Static { .. }));
    }

    #[test]
    fn test_config_rejects_unknown_kind() {
        let result: Result<AuthProviderConfig, _> =
            serde_json::from_str(r#"{"name": "azureWorkloadIdentity"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_rejects_empty_static_username() {
        let config = AuthProviderConfig::Static {
            username: String::new(),
            password: "p".to_string(),
        };
        assert!(create_auth_provider(&config).is_err());
    }

    #[tokio::test]
    async fn test_static_provider_returns_fixed_credential() {
        let provider = create_auth_provider(&AuthProviderConfig::Static {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        })
        .unwrap();

        assert!(provider.enabled());
        let credential = provider.provide("registry.example.com").await.unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("hunter2"));
        assert!(credential.expires_on.is_none());
        assert!(!credential.is_anonymous());
    }

    #[test]
    fn test_anonymous_credential() {
        assert!(AuthCredential::default().is_anonymous());
    }
}
