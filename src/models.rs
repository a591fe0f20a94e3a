//! Core data models that flow through the publish pipeline.
//!
//! Records are produced stage by stage and each one wraps the previous:
//!
//! ```text
//! Item ──▶ PackagedItem ──▶ RegisteredItem ──▶ UploadResult
//! ```
//!
//! Nothing here is persisted; every record lives for a single run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name of the metadata descriptor every item directory must carry.
pub const METADATA_FILE: &str = "metadata.json";

/// The two collections the pipeline publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tool,
    Agent,
}

impl ItemKind {
    /// Both kinds in processing order (tools first).
    pub const ALL: [ItemKind; 2] = [ItemKind::Tool, ItemKind::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Tool => "tool",
            ItemKind::Agent => "agent",
        }
    }

    /// Directory name of the collection under the source root.
    pub fn collection(&self) -> &'static str {
        match self {
            ItemKind::Tool => "tools",
            ItemKind::Agent => "agents",
        }
    }

    /// Recognized entry files, in order of preference.
    pub fn entry_files(&self) -> &'static [&'static str] {
        match self {
            ItemKind::Tool => &["tool.ts", "tool.py", "tool.js"],
            ItemKind::Agent => &["agent.json"],
        }
    }

    /// Whether metadata for this kind must declare input/output schemas.
    pub fn requires_schema(&self) -> bool {
        matches!(self, ItemKind::Tool)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" | "tools" => Ok(ItemKind::Tool),
            "agent" | "agents" => Ok(ItemKind::Agent),
            other => Err(format!(
                "unknown item kind '{}': expected tool or agent",
                other
            )),
        }
    }
}

/// Normalized metadata descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata {
    pub description: String,
    pub version: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
    /// Input schema (tools only).
    pub parameters: Option<serde_json::Value>,
    /// Output schema (tools only).
    pub result: Option<serde_json::Value>,
    /// The descriptor exactly as it was read, forwarded to the node.
    pub raw: serde_json::Value,
}

/// A validated tool or agent definition.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub source_path: PathBuf,
    pub entry_file: PathBuf,
    pub metadata: ItemMetadata,
    pub entry_content: String,
}

impl Item {
    /// File name of the entry file (e.g. `tool.ts`).
    pub fn entry_file_name(&self) -> String {
        self.entry_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// An item plus its archive.
#[derive(Debug, Clone)]
pub struct PackagedItem {
    pub item: Item,
    pub archive_bytes: Vec<u8>,
    /// Lowercase hex SHA-256 over the ordered file list and contents.
    pub archive_digest: String,
    pub file_count: usize,
}

/// A packaged item confirmed by the node.
///
/// Only constructible through [`RegisteredItem::new`], which rejects an
/// empty node identifier.
#[derive(Debug, Clone)]
pub struct RegisteredItem {
    packaged: PackagedItem,
    node_id: String,
    registered_at: DateTime<Utc>,
}

impl RegisteredItem {
    /// Returns `None` when `node_id` is blank.
    pub fn new(
        packaged: PackagedItem,
        node_id: impl Into<String>,
        registered_at: DateTime<Utc>,
    ) -> Option<Self> {
        let node_id = node_id.into();
        if node_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            packaged,
            node_id,
            registered_at,
        })
    }

    pub fn packaged(&self) -> &PackagedItem {
        &self.packaged
    }

    pub fn item(&self) -> &Item {
        &self.packaged.item
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

/// Outcome of the upload stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Uploaded,
    SkippedExists,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::SkippedExists => "skipped-exists",
            UploadStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-item upload outcome.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub name: String,
    pub kind: ItemKind,
    pub digest: String,
    pub status: UploadStatus,
    pub remote_id: Option<String>,
    pub error_detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packaged() -> PackagedItem {
        PackagedItem {
            item: Item {
                name: "echo".to_string(),
                kind: ItemKind::Tool,
                source_path: PathBuf::from("tools/echo"),
                entry_file: PathBuf::from("tools/echo/tool.ts"),
                metadata: ItemMetadata {
                    description: "Echo input".to_string(),
                    version: None,
                    author: None,
                    keywords: vec![],
                    parameters: None,
                    result: None,
                    raw: serde_json::json!({}),
                },
                entry_content: String::new(),
            },
            archive_bytes: vec![],
            archive_digest: "abc".to_string(),
            file_count: 0,
        }
    }

    #[test]
    fn registered_item_rejects_blank_node_id() {
        assert!(RegisteredItem::new(packaged(), "", Utc::now()).is_none());
        assert!(RegisteredItem::new(packaged(), "   ", Utc::now()).is_none());
        let reg = RegisteredItem::new(packaged(), "node-1", Utc::now()).unwrap();
        assert_eq!(reg.node_id(), "node-1");
        assert_eq!(reg.item().name, "echo");
    }

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("tool".parse::<ItemKind>().unwrap(), ItemKind::Tool);
        assert_eq!("agents".parse::<ItemKind>().unwrap(), ItemKind::Agent);
        assert!("widget".parse::<ItemKind>().is_err());
    }

    #[test]
    fn upload_status_display_matches_report_labels() {
        assert_eq!(UploadStatus::SkippedExists.to_string(), "skipped-exists");
        assert_eq!(
            serde_json::to_value(UploadStatus::SkippedExists).unwrap(),
            serde_json::json!("skipped-exists")
        );
    }
}
