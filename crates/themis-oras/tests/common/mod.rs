//! In-process fake OCI registry for integration tests.
//!
//! Serves just enough of the Distribution API for the store: `/v2/`
//! ping, manifest HEAD/GET, blob GET, and the referrers endpoint with
//! optional `Link` pagination. Switches emulate registries without the
//! Referrers API, registries requiring bearer tokens, and registries
//! rejecting every request.

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::body::Body;
use axum::response::Response;
use axum::Router;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const TEST_TOKEN: &str = "fake-registry-token";

#[derive(Clone)]
pub struct StoredManifest {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct RegistryState {
    addr: Mutex<Option<SocketAddr>>,
    /// `<repo>/<selector>` -> manifest; selectors are tags and digests.
    manifests: Mutex<HashMap<String, StoredManifest>>,
    /// digest -> content.
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    /// subject digest -> referrer descriptors.
    referrers: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    referrers_enabled: AtomicBool,
    /// 0 disables pagination.
    referrers_page_size: AtomicUsize,
    require_token: AtomicBool,
    deny_all: AtomicBool,
    pub manifest_fetches: AtomicUsize,
    pub blob_fetches: AtomicUsize,
}

pub struct FakeRegistry {
    pub state: Arc<RegistryState>,
    pub addr: SocketAddr,
}

impl FakeRegistry {
    pub async fn start() -> Self {
        let state = Arc::new(RegistryState {
            referrers_enabled: AtomicBool::new(true),
            ..RegistryState::default()
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake registry");
        let addr = listener.local_addr().expect("local addr");
        *state.addr.lock().unwrap() = Some(addr);

        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake registry");
        });

        Self { state, addr }
    }

    /// Registry host for building references, `127.0.0.1:<port>`.
    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    /// Registers a manifest under a tag (and under its digest), returning
    /// the digest.
    pub fn add_manifest(&self, repo: &str, tag: &str, media_type: &str, bytes: &[u8]) -> String {
        let digest = sha256_digest(bytes);
        let manifest = StoredManifest {
            media_type: media_type.to_string(),
            bytes: bytes.to_vec(),
        };
        let mut manifests = self.state.manifests.lock().unwrap();
        manifests.insert(format!("{repo}/{tag}"), manifest.clone());
        manifests.insert(format!("{repo}/{digest}"), manifest);
        digest
    }

    pub fn add_blob(&self, bytes: &[u8]) -> String {
        let digest = sha256_digest(bytes);
        self.state
            .blobs
            .lock()
            .unwrap()
            .insert(digest.clone(), bytes.to_vec());
        digest
    }

    /// Registers a blob served under `digest` with the given (possibly
    /// mismatching) bytes.
    pub fn add_blob_as(&self, digest: &str, bytes: &[u8]) {
        self.state
            .blobs
            .lock()
            .unwrap()
            .insert(digest.to_string(), bytes.to_vec());
    }

    pub fn add_referrer(&self, subject_digest: &str, descriptor: serde_json::Value) {
        self.state
            .referrers
            .lock()
            .unwrap()
            .entry(subject_digest.to_string())
            .or_default()
            .push(descriptor);
    }

    pub fn set_referrers_enabled(&self, enabled: bool) {
        self.state.referrers_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_referrers_page_size(&self, size: usize) {
        self.state.referrers_page_size.store(size, Ordering::SeqCst);
    }

    pub fn set_require_token(&self, require: bool) {
        self.state.require_token.store(require, Ordering::SeqCst);
    }

    pub fn set_deny_all(&self, deny: bool) {
        self.state.deny_all.store(deny, Ordering::SeqCst);
    }

    pub fn manifest_fetches(&self) -> usize {
        self.state.manifest_fetches.load(Ordering::SeqCst)
    }

    pub fn blob_fetches(&self) -> usize {
        self.state.blob_fetches.load(Ordering::SeqCst)
    }
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn response(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

async fn handle(
    State(state): State<Arc<RegistryState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();

    if state.deny_all.load(Ordering::SeqCst) {
        // A flat 401 without a challenge, as from a registry rejecting
        // the credentials outright.
        return response(StatusCode::UNAUTHORIZED);
    }

    if path == "/token" {
        let body = serde_json::json!({ "token": TEST_TOKEN }).to_string();
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
    }

    if state.require_token.load(Ordering::SeqCst) {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {TEST_TOKEN}"))
            .unwrap_or(false);
        if !authorized {
            let addr = state.addr.lock().unwrap().expect("addr set");
            let challenge = format!(
                "Bearer realm=\"http://{addr}/token\",service=\"fake-registry\""
            );
            return Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header(header::WWW_AUTHENTICATE, challenge)
                .body(Body::empty())
                .unwrap();
        }
    }

    if path == "/v2/" || path == "/v2" {
        return response(StatusCode::OK);
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return response(StatusCode::NOT_FOUND);
    };

    if let Some((repo, selector)) = split_route(rest, "/manifests/") {
        return serve_manifest(&state, &method, repo, selector);
    }
    if let Some((_repo, digest)) = split_route(rest, "/blobs/") {
        return serve_blob(&state, digest);
    }
    if let Some((repo, digest)) = split_route(rest, "/referrers/") {
        return serve_referrers(&state, &uri, repo, digest);
    }

    response(StatusCode::NOT_FOUND)
}

fn split_route<'a>(rest: &'a str, route: &str) -> Option<(&'a str, &'a str)> {
    rest.find(route)
        .map(|idx| (&rest[..idx], &rest[idx + route.len()..]))
}

fn serve_manifest(
    state: &RegistryState,
    method: &Method,
    repo: &str,
    selector: &str,
) -> Response {
    let manifests = state.manifests.lock().unwrap();
    let Some(manifest) = manifests.get(&format!("{repo}/{selector}")) else {
        return response(StatusCode::NOT_FOUND);
    };

    if *method == Method::GET {
        state.manifest_fetches.fetch_add(1, Ordering::SeqCst);
    }

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &manifest.media_type)
        .header(header::CONTENT_LENGTH, manifest.bytes.len())
        .header("Docker-Content-Digest", sha256_digest(&manifest.bytes));

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(manifest.bytes.clone())
    };
    builder.body(body).unwrap()
}

fn serve_blob(state: &RegistryState, digest: &str) -> Response {
    let blobs = state.blobs.lock().unwrap();
    let Some(bytes) = blobs.get(digest) else {
        return response(StatusCode::NOT_FOUND);
    };

    state.blob_fetches.fetch_add(1, Ordering::SeqCst);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes.clone()))
        .unwrap()
}

fn serve_referrers(state: &RegistryState, uri: &Uri, repo: &str, digest: &str) -> Response {
    if !state.referrers_enabled.load(Ordering::SeqCst) {
        return response(StatusCode::NOT_FOUND);
    }

    let referrers = state.referrers.lock().unwrap();
    let all = referrers.get(digest).cloned().unwrap_or_default();

    let page_size = state.referrers_page_size.load(Ordering::SeqCst);
    let (manifests, next_page) = if page_size == 0 {
        (all, None)
    } else {
        let page: usize = uri
            .query()
            .and_then(|q| {
                q.split('&')
                    .find_map(|pair| pair.strip_prefix("page="))
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(0);
        let start = page * page_size;
        let end = (start + page_size).min(all.len());
        let chunk = all.get(start..end).unwrap_or_default().to_vec();
        let next = (end < all.len()).then(|| page + 1);
        (chunk, next)
    };

    let body = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": manifests,
    })
    .to_string();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.oci.image.index.v1+json");

    if let Some(next) = next_page {
        builder = builder.header(
            header::LINK,
            format!("</v2/{repo}/referrers/{digest}?page={next}>; rel=\"next\""),
        );
    }

    builder.body(Body::from(body)).unwrap()
}
