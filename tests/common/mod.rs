#![allow(dead_code)]

//! Shared fixtures: item directories on disk and an in-process fake of the
//! node and store HTTP APIs.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use toolpress::archive::{self, ArchiveOptions};
use toolpress::models::{ItemKind, PackagedItem};
use toolpress::scanner::{self, ScanEntry};
use toolpress::validate::validate;

pub const NODE_TOKEN: &str = "node-secret";
pub const STORE_TOKEN: &str = "store-secret";

pub fn write_tool(root: &Path, dir: &str, name: &str) {
    let d = root.join("tools").join(dir);
    fs::create_dir_all(&d).unwrap();
    fs::write(
        d.join("tool.ts"),
        format!("export async function run() {{ return '{}'; }}\n", name),
    )
    .unwrap();
    fs::write(
        d.join("metadata.json"),
        json!({
            "name": name,
            "description": format!("The {} tool", name),
            "version": "1.0.0",
            "keywords": ["test"],
            "parameters": { "type": "object", "properties": { "url": { "type": "string" } } },
            "result": { "type": "object" }
        })
        .to_string(),
    )
    .unwrap();
}

pub fn write_agent(root: &Path, dir: &str, name: &str) {
    let d = root.join("agents").join(dir);
    fs::create_dir_all(&d).unwrap();
    fs::write(d.join("agent.json"), r#"{"llm_provider_id":"default","tools":[]}"#).unwrap();
    fs::write(
        d.join("metadata.json"),
        json!({ "name": name, "description": format!("The {} agent", name) }).to_string(),
    )
    .unwrap();
}

/// Source tree with both collection directories present.
pub fn source_tree() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("tools")).unwrap();
    fs::create_dir_all(tmp.path().join("agents")).unwrap();
    tmp
}

/// Validate and archive one item directory.
pub fn package(dir: &Path, kind: ItemKind) -> PackagedItem {
    let candidate = match scanner::inspect(dir, kind) {
        ScanEntry::Candidate(c) => c,
        ScanEntry::Excluded(e) => panic!("{} excluded: {}", dir.display(), e.reason),
    };
    let item = validate(scanner::load(candidate).unwrap()).unwrap();
    archive::archive(item, &ArchiveOptions::default()).unwrap()
}

#[derive(Default)]
pub struct Recorded {
    /// Node records keyed by kind + name.
    pub node_records: HashMap<(String, String), String>,
    pub node_requests: usize,
    pub store_digests: HashSet<String>,
    pub store_requests: usize,
    pub unauthorized: usize,
}

/// Fake node and store sharing one listener.
#[derive(Clone, Default)]
pub struct FakeRemote {
    pub recorded: Arc<Mutex<Recorded>>,
    /// Names the node answers with HTTP 500.
    pub failing: Arc<HashSet<String>>,
}

impl FakeRemote {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: Arc::new(names.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Serve on an ephemeral port and return the base address.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/v2/tools", post(register))
            .route("/v2/agents", post(register))
            .route("/api/v1/artifacts", post(upload))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub fn node_record_count(&self) -> usize {
        self.recorded.lock().unwrap().node_records.len()
    }

    pub fn store_digest_count(&self) -> usize {
        self.recorded.lock().unwrap().store_digests.len()
    }
}

fn bearer_is(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", token))
        .unwrap_or(false)
}

async fn register(
    State(remote): State<FakeRemote>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut recorded = remote.recorded.lock().unwrap();
    recorded.node_requests += 1;
    if !bearer_is(&headers, NODE_TOKEN) {
        recorded.unauthorized += 1;
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }
    let kind = body["kind"].as_str().unwrap_or_default().to_string();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if remote.failing.contains(&name) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "node exploded" })),
        );
    }
    if body["content"].as_str().unwrap_or_default().is_empty() || !body["metadata"].is_object() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "incomplete" })));
    }
    let next = recorded.node_records.len() + 1;
    let id = recorded
        .node_records
        .entry((kind, name))
        .or_insert_with(|| format!("node-{}", next))
        .clone();
    (StatusCode::OK, Json(json!({ "data": { "id": id } })))
}

async fn upload(
    State(remote): State<FakeRemote>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut recorded = remote.recorded.lock().unwrap();
    recorded.store_requests += 1;
    if !bearer_is(&headers, STORE_TOKEN) {
        recorded.unauthorized += 1;
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }
    if body["node_id"].as_str().unwrap_or_default().is_empty()
        || body["archive"].as_str().unwrap_or_default().is_empty()
    {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "incomplete" })));
    }
    let digest = body["digest"].as_str().unwrap_or_default().to_string();
    if !recorded.store_digests.insert(digest) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "artifact already exists" })),
        );
    }
    let id = format!("artifact-{}", recorded.store_digests.len());
    (StatusCode::CREATED, Json(json!({ "id": id })))
}
