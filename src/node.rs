//! Node registration.
//!
//! Each packaged item is submitted to the local node, which persists it (and
//! may build its own package server-side). Registration is keyed by
//! `kind` + `name`: submitting an item again updates the existing record.
//!
//! # Request
//!
//! `POST {addr}{tool_path|agent_path}` with `Authorization: Bearer <token>`:
//!
//! ```json
//! {
//!   "kind": "tool",
//!   "name": "Download Page",
//!   "metadata": { ... },
//!   "entry_file": "tool.ts",
//!   "content": "export async function run() { ... }",
//!   "archive_digest": "9f86d0..."
//! }
//! ```
//!
//! # Response
//!
//! Any 2xx JSON body carrying a non-empty `id` (or `key` / `tool_router_key`).

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

use crate::config::NodeConfig;
use crate::error::RegistrationError;
use crate::models::{ItemKind, PackagedItem, RegisteredItem};

/// The node service as seen by the pipeline.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Create or update the node's record for `item`.
    async fn register(&self, item: &PackagedItem) -> Result<RegisteredItem, RegistrationError>;
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    kind: ItemKind,
    name: &'a str,
    metadata: &'a serde_json::Value,
    entry_file: String,
    content: &'a str,
    archive_digest: &'a str,
}

/// HTTP client for the node's registration endpoints.
pub struct NodeClient {
    client: reqwest::Client,
    config: NodeConfig,
}

impl NodeClient {
    pub fn new(config: NodeConfig, timeout: Duration) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistrationError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, kind: ItemKind) -> String {
        let path = match kind {
            ItemKind::Tool => &self.config.tool_path,
            ItemKind::Agent => &self.config.agent_path,
        };
        join_url(&self.config.addr, path)
    }
}

#[async_trait]
impl NodeApi for NodeClient {
    async fn register(&self, packaged: &PackagedItem) -> Result<RegisteredItem, RegistrationError> {
        let item = &packaged.item;
        let url = self.endpoint(item.kind);
        tracing::debug!("registering {} '{}' at {}", item.kind, item.name, url);

        let body = RegisterRequest {
            kind: item.kind,
            name: &item.name,
            metadata: &item.metadata.raw,
            entry_file: item.entry_file_name(),
            content: &item.entry_content,
            archive_digest: &packaged.archive_digest,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistrationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RegistrationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let node_id = parse_node_id(&text).ok_or_else(|| RegistrationError::MissingId {
            body: text.clone(),
        })?;
        RegisteredItem::new(packaged.clone(), node_id, Utc::now())
            .ok_or(RegistrationError::MissingId { body: text })
    }
}

/// Extract the node-assigned identifier from a confirmation payload.
fn parse_node_id(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    // Some node versions wrap the record in `data`.
    let record = json.get("data").filter(|d| d.is_object()).unwrap_or(&json);
    ["id", "key", "tool_router_key"]
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Join a base address and a path without doubling or dropping the `/`.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
