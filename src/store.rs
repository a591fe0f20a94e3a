//! Remote store uploads.
//!
//! Pushes a registered item's archive and descriptor to the store. An
//! artifact the store already holds is reported as
//! [`UploadError::AlreadyExists`], which the pipeline records as
//! `skipped-exists` rather than a failure. No retries happen here.
//!
//! # Request
//!
//! `POST {addr}{upload_path}` with `Authorization: Bearer <token>`; the
//! archive travels base64-encoded inside the JSON body.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::time::Duration;

use crate::archive::archive_file_stem;
use crate::config::StoreConfig;
use crate::error::UploadError;
use crate::models::{ItemKind, RegisteredItem};
use crate::node::join_url;

/// The remote store as seen by the pipeline.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Upload `item`; returns the store's identifier when it reports one.
    async fn upload(&self, item: &RegisteredItem) -> Result<Option<String>, UploadError>;
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    name: &'a str,
    kind: ItemKind,
    version: Option<&'a str>,
    description: &'a str,
    author: Option<&'a str>,
    keywords: &'a [String],
    digest: &'a str,
    node_id: &'a str,
    file_name: String,
    archive: String,
}

/// HTTP client for the store's upload endpoint.
pub struct StoreClient {
    client: reqwest::Client,
    config: StoreConfig,
}

impl StoreClient {
    pub fn new(config: StoreConfig, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl StoreApi for StoreClient {
    async fn upload(&self, registered: &RegisteredItem) -> Result<Option<String>, UploadError> {
        let packaged = registered.packaged();
        let item = &packaged.item;
        let url = join_url(&self.config.addr, &self.config.upload_path);
        tracing::debug!(
            "uploading {} '{}' ({} bytes) to {}",
            item.kind,
            item.name,
            packaged.archive_bytes.len(),
            url
        );

        let body = UploadRequest {
            name: &item.name,
            kind: item.kind,
            version: item.metadata.version.as_deref(),
            description: &item.metadata.description,
            author: item.metadata.author.as_deref(),
            keywords: &item.metadata.keywords,
            digest: &packaged.archive_digest,
            node_id: registered.node_id(),
            file_name: format!("{}.zip", archive_file_stem(&item.name)),
            archive: STANDARD.encode(&packaged.archive_bytes),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(parse_remote_id(&text));
        }
        if is_already_exists(status.as_u16(), &text) {
            return Err(UploadError::AlreadyExists);
        }
        Err(UploadError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

/// 409, or a client error whose body says the artifact exists.
fn is_already_exists(status: u16, body: &str) -> bool {
    if status == 409 {
        return true;
    }
    (400..500).contains(&status) && body.to_ascii_lowercase().contains("already exists")
}

fn parse_remote_id(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("id")
        .or_else(|| json.get("product_id"))
        .and_then(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_means_already_exists() {
        assert!(is_already_exists(409, ""));
        assert!(is_already_exists(400, r#"{"error":"Product Already Exists"}"#));
        assert!(!is_already_exists(400, r#"{"error":"bad archive"}"#));
        assert!(!is_already_exists(500, "already exists"));
    }

    #[test]
    fn remote_id_is_optional() {
        assert_eq!(parse_remote_id(r#"{"id":"p-1"}"#).as_deref(), Some("p-1"));
        assert_eq!(parse_remote_id(r#"{"product_id":7}"#).as_deref(), Some("7"));
        assert!(parse_remote_id("").is_none());
        assert!(parse_remote_id(r#"{"ok":true}"#).is_none());
    }
}
