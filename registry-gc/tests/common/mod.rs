#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, LINK};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use registry_gc::config::Config;
use registry_gc::error::ReclaimError;
use registry_gc::reclaim::Reclaimer;
use registry_gc::utils::cli::Args;
use serde_json::json;
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const MANIFEST_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

#[derive(Default)]
struct FakeState {
    // repo -> tag -> digest
    repos: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    failing_tags: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    deletes: Mutex<Vec<String>>,
    catalog_page: Mutex<Option<usize>>,
    authorization: Option<String>,
    // path the API is mounted under, e.g. `/registry`
    prefix: String,
}

/// A distribution API served from memory on a loopback port.
pub struct FakeRegistry {
    pub url: String,
    state: Arc<FakeState>,
}

impl FakeRegistry {
    pub async fn start() -> Self {
        Self::serve(FakeState::default()).await
    }

    /// Rejects every request not carrying these basic-auth credentials.
    pub async fn start_with_auth(user: &str, pass: &str) -> Self {
        Self::serve(FakeState {
            authorization: Some(basic_auth(user, pass)),
            ..FakeState::default()
        })
        .await
    }

    /// Mounts the API under `prefix`, as behind a reverse proxy.
    pub async fn start_behind_prefix(prefix: &str) -> Self {
        Self::serve(FakeState {
            prefix: prefix.to_string(),
            ..FakeState::default()
        })
        .await
    }

    async fn serve(state: FakeState) -> Self {
        let state = Arc::new(state);
        let prefix = state.prefix.clone();
        let app = Router::new()
            .route("/v2/{*tail}", any(dispatch))
            .with_state(state.clone());
        let app = if prefix.is_empty() {
            app
        } else {
            Router::new().nest(&prefix, app)
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}{prefix}"),
            state,
        }
    }

    pub fn push(&self, repo: &str, tag: &str) {
        let digest = format!(
            "sha256:{}",
            hex::encode(Sha256::digest(format!("{repo}:{tag}").as_bytes()))
        );
        self.state
            .repos
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .insert(tag.to_string(), digest);
    }

    pub fn push_all(&self, repo: &str, tags: &[&str]) {
        for tag in tags {
            self.push(repo, tag);
        }
    }

    /// A repository whose tags were all deleted; the registry keeps it in the
    /// catalog and reports `"tags": null`.
    pub fn create_empty(&self, repo: &str) {
        self.state
            .repos
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default();
    }

    pub fn tags(&self, repo: &str) -> Vec<String> {
        self.state
            .repos
            .lock()
            .unwrap()
            .get(repo)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn digest_of(&self, repo: &str, tag: &str) -> String {
        self.state.repos.lock().unwrap()[repo][tag].clone()
    }

    pub fn fail_tags(&self, repo: &str) {
        self.state.failing_tags.lock().unwrap().insert(repo.to_string());
    }

    pub fn fail_deletes(&self, repo: &str) {
        self.state
            .failing_deletes
            .lock()
            .unwrap()
            .insert(repo.to_string());
    }

    /// Caps catalog pages regardless of the requested `n`.
    pub fn set_catalog_page(&self, size: usize) {
        *self.state.catalog_page.lock().unwrap() = Some(size);
    }

    /// `repo@digest` for every accepted DELETE.
    pub fn deletes(&self) -> Vec<String> {
        self.state.deletes.lock().unwrap().clone()
    }
}

pub fn basic_auth(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

async fn dispatch(
    State(state): State<Arc<FakeState>>,
    method: Method,
    Path(tail): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(expected) = &state.authorization {
        let given = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
        }
    }

    if tail == "_catalog" {
        return catalog(&state, &query);
    }
    if let Some(repo) = tail.strip_suffix("/tags/list") {
        return tags(&state, repo);
    }
    if let Some((repo, reference)) = tail.rsplit_once("/manifests/") {
        return match method {
            Method::GET | Method::HEAD => manifest(&state, repo, reference),
            Method::DELETE => delete(&state, repo, reference),
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }
    error(StatusCode::NOT_FOUND, "NAME_UNKNOWN")
}

fn catalog(state: &FakeState, query: &HashMap<String, String>) -> Response {
    let requested = query
        .get("n")
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let n = match *state.catalog_page.lock().unwrap() {
        Some(cap) => requested.min(cap),
        None => requested,
    };
    let last = query.get("last").cloned().unwrap_or_default();

    let repos = state.repos.lock().unwrap();
    let remaining: Vec<&String> = repos.keys().filter(|name| **name > last).collect();
    let page: Vec<String> = remaining.iter().take(n).map(|s| s.to_string()).collect();

    let mut response = axum::Json(json!({ "repositories": page })).into_response();
    if remaining.len() > page.len() {
        if let Some(last) = page.last() {
            let link = format!(
                "<{}/v2/_catalog?n={n}&last={last}>; rel=\"next\"",
                state.prefix
            );
            response.headers_mut().insert(LINK, link.parse().unwrap());
        }
    }
    response
}

fn tags(state: &FakeState, repo: &str) -> Response {
    if state.failing_tags.lock().unwrap().contains(repo) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN");
    }
    let repos = state.repos.lock().unwrap();
    match repos.get(repo) {
        Some(tags) if tags.is_empty() => {
            axum::Json(json!({ "name": repo, "tags": null })).into_response()
        }
        Some(tags) => {
            let tags: Vec<&String> = tags.keys().collect();
            axum::Json(json!({ "name": repo, "tags": tags })).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "NAME_UNKNOWN"),
    }
}

fn manifest(state: &FakeState, repo: &str, reference: &str) -> Response {
    let repos = state.repos.lock().unwrap();
    let Some(digest) = repos.get(repo).and_then(|tags| tags.get(reference)) else {
        return error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN");
    };
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert("docker-content-digest", digest.parse().unwrap());
    headers.insert(CONTENT_TYPE, MANIFEST_TYPE.parse().unwrap());
    response
}

fn delete(state: &FakeState, repo: &str, digest: &str) -> Response {
    if state.failing_deletes.lock().unwrap().contains(repo) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN");
    }
    let mut repos = state.repos.lock().unwrap();
    let Some(tags) = repos.get_mut(repo) else {
        return error(StatusCode::NOT_FOUND, "NAME_UNKNOWN");
    };
    let before = tags.len();
    tags.retain(|_, d| d != digest);
    if tags.len() == before {
        return error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN");
    }
    state.deletes.lock().unwrap().push(format!("{repo}@{digest}"));
    StatusCode::ACCEPTED.into_response()
}

fn error(status: StatusCode, code: &str) -> Response {
    (
        status,
        axum::Json(json!({ "errors": [{ "code": code, "message": code }] })),
    )
        .into_response()
}

/// Counts collections instead of running one.
#[derive(Default)]
pub struct CountingReclaimer {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingReclaimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Reclaimer for CountingReclaimer {
    async fn reclaim(&self, cancel: &CancellationToken) -> Result<String, ReclaimError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => Err(ReclaimError::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok("blobs marked, 0 eligible".to_string()),
        }
    }
}

pub fn config(argv: &[&str]) -> Config {
    let argv = std::iter::once("registry-gc").chain(argv.iter().copied());
    Config::from_args(&Args::try_parse_from(argv).unwrap()).unwrap()
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
