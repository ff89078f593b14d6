//! OCI Distribution v2 protocol driver.
//!
//! A [`RepositoryClient`] is bound to a single repository and drives the
//! wire protocol: subject resolution, the Referrers API (with `Link`
//! header pagination), manifest and blob fetches. Token authentication
//! follows the Distribution challenge flow: a `401` carrying a
//! `WWW-Authenticate: Bearer` challenge triggers a token fetch against
//! the named realm, the token is cached per scope inside the client, and
//! the request is retried once.

use crate::auth::AuthCredential;
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use themis_core::descriptor::{Descriptor, MediaType};
use themis_core::manifest::ImageIndex;
use themis_core::{digest, Reference, StoreError};
use tokio::sync::RwLock;
use tracing::debug;

/// User-Agent header attached to every registry request.
pub(crate) const USER_AGENT: &str = "themis";

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.artifact.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// A registry client bound to one repository.
#[derive(Debug)]
pub struct RepositoryClient {
    reference: Reference,
    credential: AuthCredential,
    http: reqwest::Client,
    scheme: &'static str,
    /// Bearer tokens by scope, filled by the challenge flow.
    tokens: RwLock<HashMap<String, String>>,
}

impl RepositoryClient {
    /// Creates a client for `reference` using the given transport.
    /// `plain_http` selects `http` over `https` for registry URLs.
    #[must_use]
    pub fn new(
        reference: Reference,
        credential: AuthCredential,
        http: reqwest::Client,
        plain_http: bool,
    ) -> Self {
        Self {
            reference,
            credential,
            http,
            scheme: if plain_http { "http" } else { "https" },
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// The reference this client is bound to.
    #[must_use]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    fn repo_url(&self) -> String {
        format!(
            "{}://{}/v2/{}",
            self.scheme,
            self.reference.registry(),
            self.reference.repository()
        )
    }

    fn manifest_url(&self, selector: &str) -> String {
        format!("{}/manifests/{selector}", self.repo_url())
    }

    fn blob_url(&self, digest_str: &str) -> String {
        format!("{}/blobs/{digest_str}", self.repo_url())
    }

    fn referrers_url(&self, subject_digest: &str, artifact_type: Option<&str>) -> String {
        let mut url = format!("{}/referrers/{subject_digest}", self.repo_url());
        if let Some(artifact_type) = artifact_type {
            url.push_str("?artifactType=");
            url.push_str(artifact_type);
        }
        url
    }

    /// Turns a `Link` header target into an absolute URL.
    fn absolute_url(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else if link.starts_with('/') {
            format!("{}://{}{link}", self.scheme, self.reference.registry())
        } else {
            format!("{}://{}/{link}", self.scheme, self.reference.registry())
        }
    }

    fn network_error(&self, err: &reqwest::Error) -> StoreError {
        StoreError::Registry {
            reference: self.reference.original().to_string(),
            status: None,
            message: err.to_string(),
        }
    }

    async fn status_error(&self, response: Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Registry {
            reference: self.reference.original().to_string(),
            status: Some(status),
            message,
        }
    }

    fn parse_error(&self, reason: impl std::fmt::Display) -> StoreError {
        StoreError::ManifestParse {
            reference: self.reference.original().to_string(),
            reason: reason.to_string(),
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<Response, StoreError> {
        let mut builder = self
            .http
            .request(method, url)
            .header(header::USER_AGENT, USER_AGENT);

        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }

        builder = if let Some(token) = bearer {
            builder.bearer_auth(token)
        } else if let Some(username) = &self.credential.username {
            builder.basic_auth(username, self.credential.password.as_deref())
        } else {
            builder
        };

        builder.send().await.map_err(|e| self.network_error(&e))
    }

    /// Sends a request, honoring a bearer challenge on `401` with a
    /// single token-authenticated retry.
    async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Response, StoreError> {
        let scope = format!("repository:{}:pull", self.reference.repository());

        let cached = self.tokens.read().await.get(&scope).cloned();
        let response = self
            .request(method.clone(), url, accept, cached.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(BearerChallenge::parse);

        let Some(challenge) = challenge else {
            // No bearer challenge; the 401 stands.
            return Ok(response);
        };

        let token = self.fetch_token(&challenge, &scope).await?;
        self.tokens
            .write()
            .await
            .insert(scope.clone(), token.clone());

        self.request(method, url, accept, Some(&token)).await
    }

    /// Exchanges credentials for a bearer token at the challenge realm.
    async fn fetch_token(
        &self,
        challenge: &BearerChallenge,
        scope: &str,
    ) -> Result<String, StoreError> {
        debug!(realm = %challenge.realm, scope, "Fetching registry token");

        let response = if let Some(identity_token) = &self.credential.identity_token {
            // OAuth2 refresh-token grant.
            let mut form = vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", identity_token.as_str()),
                ("client_id", USER_AGENT),
                ("scope", scope),
            ];
            if let Some(service) = &challenge.service {
                form.push(("service", service.as_str()));
            }
            self.http
                .post(&challenge.realm)
                .header(header::USER_AGENT, USER_AGENT)
                .form(&form)
                .send()
                .await
        } else {
            let mut builder = self
                .http
                .get(&challenge.realm)
                .header(header::USER_AGENT, USER_AGENT)
                .query(&[("scope", scope)]);
            if let Some(service) = &challenge.service {
                builder = builder.query(&[("service", service.as_str())]);
            }
            if let Some(username) = &self.credential.username {
                builder = builder.basic_auth(username, self.credential.password.as_deref());
            }
            builder.send().await
        }
        .map_err(|e| self.network_error(&e))?;

        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            token: Option<String>,
            access_token: Option<String>,
        }

        let body: TokenResponse = response.json().await.map_err(|e| self.network_error(&e))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| StoreError::Registry {
                reference: self.reference.original().to_string(),
                status: None,
                message: "token service returned no token".to_string(),
            })
    }

    /// Resolves a tag or digest to the subject descriptor.
    ///
    /// Prefers a `HEAD` request reading `Docker-Content-Digest`; falls
    /// back to a `GET` computing the digest from the body when the
    /// registry omits the header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] on any non-success status.
    pub async fn resolve(&self, selector: &str) -> Result<Descriptor, StoreError> {
        let url = self.manifest_url(selector);

        let response = self
            .send(Method::HEAD, &url, Some(MANIFEST_ACCEPT))
            .await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let media_type = content_type(response.headers());
        if let Some(digest_str) = header_value(response.headers(), DOCKER_CONTENT_DIGEST) {
            digest::validate(&digest_str)?;
            let size = header_value(response.headers(), header::CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return Ok(Descriptor::new(media_type, digest_str, size));
        }

        debug!(%url, "Registry omitted Docker-Content-Digest, resolving via GET");
        let response = self.send(Method::GET, &url, Some(MANIFEST_ACCEPT)).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        let media_type = content_type(response.headers());
        let body = response.bytes().await.map_err(|e| self.network_error(&e))?;
        Ok(Descriptor::new(
            media_type,
            digest::compute(&body),
            body.len() as u64,
        ))
    }

    /// Lists all descriptors referring to `subject_digest`, following
    /// `Link` pagination until exhausted. Registries without the
    /// Referrers API answer `404`, which is an empty result here, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] on any other non-success status.
    pub async fn referrers(
        &self,
        subject_digest: &str,
        artifact_type: Option<&str>,
    ) -> Result<Vec<Descriptor>, StoreError> {
        let mut referrers = Vec::new();
        let mut next = Some(self.referrers_url(subject_digest, artifact_type));

        while let Some(url) = next.take() {
            let response = self
                .send(Method::GET, &url, Some(MediaType::OCI_INDEX))
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                // The registry does not implement the Referrers API.
                debug!(%url, "Referrers endpoint not found, treating as empty");
                return Ok(Vec::new());
            }
            if !response.status().is_success() {
                return Err(self.status_error(response).await);
            }

            next = header_value(response.headers(), header::LINK.as_str())
                .and_then(|link| parse_next_link(&link))
                .map(|link| self.absolute_url(&link));

            let index: ImageIndex = response.json().await.map_err(|e| self.parse_error(e))?;
            referrers.extend(index.manifests);
        }

        Ok(referrers)
    }

    /// Fetches the raw manifest bytes for a digest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] on any non-success status.
    pub async fn fetch_manifest(&self, digest_str: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.manifest_url(digest_str);
        let response = self.send(Method::GET, &url, Some(MANIFEST_ACCEPT)).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        let body = response.bytes().await.map_err(|e| self.network_error(&e))?;
        Ok(body.to_vec())
    }

    /// Fetches a blob by digest, returning the observed descriptor and
    /// the bytes. The descriptor size is only known after the fetch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] on any non-success status.
    pub async fn fetch_blob(
        &self,
        digest_str: &str,
    ) -> Result<(Descriptor, Vec<u8>), StoreError> {
        let url = self.blob_url(digest_str);
        let response = self.send(Method::GET, &url, None).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let media_type = content_type(response.headers());
        let body = response.bytes().await.map_err(|e| self.network_error(&e))?;
        let descriptor = Descriptor::new(media_type, digest_str, body.len() as u64);
        Ok((descriptor, body.to_vec()))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn content_type(headers: &HeaderMap) -> MediaType {
    header_value(headers, header::CONTENT_TYPE.as_str())
        .map_or_else(|| MediaType::new("application/octet-stream"), MediaType::new)
}

/// A parsed `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header.strip_prefix("Bearer ")?;

        let mut realm = None;
        let mut service = None;
        for param in params.split(',') {
            let (key, value) = param.trim().split_once('=')?;
            let value = value.trim_matches('"');
            match key.trim() {
                "realm" => realm = Some(value.to_string()),
                "service" => service = Some(value.to_string()),
                _ => {}
            }
        }

        realm.map(|realm| Self { realm, service })
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
fn parse_next_link(header: &str) -> Option<String> {
    for link in header.split(',') {
        let link = link.trim();
        let Some((target, params)) = link.split_once(';') else {
            continue;
        };
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        if params
            .split(';')
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"))
        {
            return Some(target.to_string());
        }
    }
    None
}
