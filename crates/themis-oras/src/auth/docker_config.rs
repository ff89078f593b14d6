//! Docker `config.json` credential provider.
//!
//! Reads the `auths` table of a Docker client configuration file. Entry
//! keys may be bare hosts (`registry.example.com`), URLs
//! (`https://registry.example.com/v1/`), or the legacy Docker Hub key
//! `https://index.docker.io/v1/`.

use super::{AuthCredential, AuthError, AuthProvider};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

const DOCKER_HUB_HOST: &str = "docker.io";
const DOCKER_HUB_LEGACY_KEY: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    /// base64 of `username:password`.
    #[serde(default)]
    auth: Option<String>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,

    #[serde(default)]
    identitytoken: Option<String>,
}

/// Provider backed by a Docker `config.json` file.
///
/// The file is re-read on every `provide` call so that credential
/// rotation (e.g. a refreshed mounted secret) is picked up without
/// restarting the store.
#[derive(Debug)]
pub struct DockerConfigProvider {
    config_path: Option<PathBuf>,
}

impl DockerConfigProvider {
    /// Creates a provider reading from `config_path`, or from
    /// `<home>/.docker/config.json` when `None`.
    #[must_use]
    pub const fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    fn effective_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".docker")
                .join("config.json")
        })
    }

    fn load(&self) -> Result<DockerConfigFile, AuthError> {
        let path = self.effective_path();
        let raw = std::fs::read(&path).map_err(|source| AuthError::Io { path, source })?;
        serde_json::from_slice(&raw).map_err(|e| AuthError::Decode {
            reason: e.to_string(),
        })
    }

    /// Matches an `auths` key against a registry host, tolerating URL
    /// shaped keys.
    fn key_matches(key: &str, registry_host: &str) -> bool {
        if key == registry_host {
            return true;
        }

        let stripped = key
            .strip_prefix("https://")
            .or_else(|| key.strip_prefix("http://"))
            .unwrap_or(key);
        let host = stripped.split('/').next().unwrap_or(stripped);

        if host == registry_host {
            return true;
        }

        // Docker Hub goes by several names.
        registry_host == DOCKER_HUB_HOST
            && (key == DOCKER_HUB_LEGACY_KEY
                || host == "index.docker.io"
                || host == "registry-1.docker.io")
    }

    fn credential_from_entry(entry: &DockerAuthEntry) -> Result<AuthCredential, AuthError> {
        let (mut username, mut password) = (entry.username.clone(), entry.password.clone());

        if let Some(encoded) = &entry.auth {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| AuthError::Decode {
                    reason: format!("invalid base64 in auth entry: {e}"),
                })?;
            let decoded = String::from_utf8(decoded).map_err(|e| AuthError::Decode {
                reason: format!("auth entry is not UTF-8: {e}"),
            })?;
            let (user, pass) = decoded.split_once(':').ok_or_else(|| AuthError::Decode {
                reason: "auth entry is not 'username:password'".to_string(),
            })?;
            username = Some(user.to_string());
            password = Some(pass.to_string());
        }

        Ok(AuthCredential {
            username,
            password,
            identity_token: entry.identitytoken.clone(),
            expires_on: None,
        })
    }
}

#[async_trait]
impl AuthProvider for DockerConfigProvider {
    fn enabled(&self) -> bool {
        true
    }

    async fn provide(&self, registry_host: &str) -> Result<AuthCredential, AuthError> {
        let config = self.load()?;

        for (key, entry) in &config.auths {
            if Self::key_matches(key, registry_host) {
                return Self::credential_from_entry(entry);
            }
        }

        // No entry means anonymous, not failure.
        Ok(AuthCredential::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn provider_for(content: &str) -> (DockerConfigProvider, tempfile::NamedTempFile) {
        let file = write_config(content);
        let provider = DockerConfigProvider::new(Some(file.path().to_path_buf()));
        (provider, file)
    }

    #[tokio::test]
    async fn test_provide_from_auth_field() {
        // base64("user:pass")
        let (provider, _file) = provider_for(
            r#"{"auths": {"registry.example.com": {"auth": "dXNlcjpwYXNz"}}}"#,
        );

        let credential = provider.provide("registry.example.com").await.unwrap();
        assert_eq!(credential.username.as_deref(), Some("user"));
        assert_eq!(credential.password.as_deref(), Some("pass"));
    }

    #[tokio::test]
    async fn test_provide_from_explicit_fields() {
        let (provider, _file) = provider_for(
            r#"{"auths": {"registry.example.com": {"username": "u", "password": "p", "identitytoken": "tok"}}}"#,
        );

        let credential = provider.provide("registry.example.com").await.unwrap();
        assert_eq!(credential.username.as_deref(), Some("u"));
        assert_eq!(credential.identity_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_provide_url_shaped_key() {
        let (provider, _file) = provider_for(
            r#"{"auths": {"https://registry.example.com/v1/": {"auth": "dXNlcjpwYXNz"}}}"#,
        );

        let credential = provider.provide("registry.example.com").await.unwrap();
        assert_eq!(credential.username.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_provide_docker_hub_legacy_key() {
        let (provider, _file) = provider_for(
            r#"{"auths": {"https://index.docker.io/v1/": {"auth": "dXNlcjpwYXNz"}}}"#,
        );

        let credential = provider.provide("docker.io").await.unwrap();
        assert_eq!(credential.username.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_provide_unknown_host_is_anonymous() {
        let (provider, _file) = provider_for(
            r#"{"auths": {"registry.example.com": {"auth": "dXNlcjpwYXNz"}}}"#,
        );

        let credential = provider.provide("other.example.com").await.unwrap();
        assert!(credential.is_anonymous());
    }

    #[tokio::test]
    async fn test_provide_missing_file_errors() {
        let provider =
            DockerConfigProvider::new(Some(PathBuf::from("/nonexistent/config.json")));
        let err = provider.provide("registry.example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Io { .. }));
    }

    #[tokio::test]
    async fn test_provide_malformed_auth_errors() {
        let (provider, _file) = provider_for(
            r#"{"auths": {"registry.example.com": {"auth": "!!!not-base64!!!"}}}"#,
        );

        let err = provider.provide("registry.example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Decode { .. }));
    }
}
