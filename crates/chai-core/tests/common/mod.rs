//! In-process mock registry shared by the integration tests.
//!
//! Routes are registered by exact path; every request is counted so tests
//! can assert which downloads happened.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use chai_core::config::Endpoints;
use chai_core::pkg::Registries;
use chai_core::Sandbox;
use chai_util::hash::{sha512_integrity, Algorithm, IntegrityHasher};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone)]
struct Route {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

#[derive(Clone, Default)]
struct MockState {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

pub struct MockRegistry {
    pub base: String,
    state: MockState,
}

impl MockRegistry {
    /// Bind to an ephemeral port and serve in the background.
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .fallback(serve_route)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://{addr}/"),
            state,
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::all_at(&self.base)
    }

    pub fn registries(&self) -> Registries {
        Registries::new(&self.endpoints()).unwrap()
    }

    /// Absolute URL for a server path such as `/npm/a/-/a-1.0.0.tgz`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn insert(&self, path: &str, route: Route) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), route);
    }

    pub fn json(&self, path: &str, value: &Value) {
        self.insert(
            path,
            Route {
                status: StatusCode::OK,
                content_type: "application/json",
                body: Bytes::from(serde_json::to_vec(value).unwrap()),
            },
        );
    }

    pub fn bytes(&self, path: &str, data: Vec<u8>) {
        self.insert(
            path,
            Route {
                status: StatusCode::OK,
                content_type: "application/octet-stream",
                body: Bytes::from(data),
            },
        );
    }

    pub fn status(&self, path: &str, status: StatusCode) {
        self.insert(
            path,
            Route {
                status,
                content_type: "text/plain",
                body: Bytes::from_static(b"mock"),
            },
        );
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Serve an npm package: packument at `/npm/<name>`, tarballs below it.
    ///
    /// Each version is `(version, dependencies, extra package.json fields)`.
    pub fn npm_package(&self, name: &str, versions: &[(&str, Value, Value)]) {
        let mut entries = serde_json::Map::new();
        let mut latest = None;

        for (version, deps, extra) in versions {
            let mut manifest = json!({ "name": name, "version": version, "dependencies": deps });
            if let (Some(target), Some(fields)) = (manifest.as_object_mut(), extra.as_object()) {
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
            }

            let tarball = tgz(&[
                ("package/package.json", manifest.to_string().as_str()),
                ("package/index.js", "module.exports = 1;\n"),
            ]);
            let path = npm_tarball_path(name, version);
            let integrity = sha512_integrity(&tarball).to_sri();
            self.bytes(&path, tarball);

            let mut entry = manifest.clone();
            entry["dist"] = json!({ "tarball": self.url(&path), "integrity": integrity });
            entries.insert((*version).to_string(), entry);
            latest = Some(*version);
        }

        self.json(
            &format!("/npm/{name}"),
            &json!({
                "name": name,
                "dist-tags": { "latest": latest.unwrap_or_default() },
                "versions": entries,
            }),
        );
    }
}

pub fn npm_tarball_path(name: &str, version: &str) -> String {
    format!("/npm/{name}/-/{name}-{version}.tgz")
}

async fn serve_route(State(state): State<MockState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    *state.hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    let route = state.routes.lock().unwrap().get(&path).cloned();
    match route {
        Some(route) => (
            route.status,
            [(header::CONTENT_TYPE, route.content_type)],
            route.body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Build a tar archive from `(path, contents)` pairs.
pub fn tar_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut out);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, data.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
    }
    out
}

/// Gzip-compressed tar archive.
pub fn tgz(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_of(entries)).unwrap();
    encoder.finish().unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = IntegrityHasher::new(Some(Algorithm::Sha256));
    hasher.update(data);
    hasher.finish().extra.unwrap().to_hex()
}

/// A fresh sandbox with all directories created.
pub fn sandbox() -> (TempDir, Sandbox) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Sandbox::new(dir.path().join(".chai"));
    sandbox.ensure_dirs().unwrap();
    (dir, sandbox)
}
