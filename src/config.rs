//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides.
//! Every field has a default, so an absent file is equivalent to an empty
//! one.
//!
//! ```toml
//! [node]
//! addr = "http://localhost:9950"
//! token = "${BEARER_TOKEN}"
//!
//! [store]
//! addr = "https://store.example.com"
//! token = "${STORE_TOKEN}"
//!
//! [pipeline]
//! root = "."
//! concurrency = 4
//! max_attempts = 3
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `HANZO_NODE_ADDR` | `node.addr` |
//! | `BEARER_TOKEN` | `node.token` |
//! | `HANZO_STORE_ADDR` | `store.addr` |
//! | `HANZO_STORE_TOKEN` | `store.token` |
//!
//! `${VAR}` references inside address and token strings are expanded from
//! the environment as well.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "./toolpress.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_node_addr")]
    pub addr: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_tool_path")]
    pub tool_path: String,
    #[serde(default = "default_agent_path")]
    pub agent_path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: default_node_addr(),
            token: String::new(),
            tool_path: default_tool_path(),
            agent_path: default_agent_path(),
        }
    }
}

fn default_node_addr() -> String {
    "http://localhost:9950".to_string()
}
fn default_tool_path() -> String {
    "/v2/tools".to_string()
}
fn default_agent_path() -> String {
    "/v2/agents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            token: String::new(),
            upload_path: default_upload_path(),
        }
    }
}

fn default_upload_path() -> String {
    "/api/v1/artifacts".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Directory holding the `tools/` and `agents/` collections.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            exclude_globs: Vec::new(),
            output_dir: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Apply environment overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("HANZO_NODE_ADDR") {
            self.node.addr = v;
        }
        if let Some(v) = non_empty("BEARER_TOKEN") {
            self.node.token = v;
        }
        if let Some(v) = non_empty("HANZO_STORE_ADDR") {
            self.store.addr = v;
        }
        if let Some(v) = non_empty("HANZO_STORE_TOKEN") {
            self.store.token = v;
        }
    }

    /// Check the settings a run depends on.
    ///
    /// With `require_remote`, the node and store addresses and both tokens
    /// must be present; a dry run needs none of them.
    pub fn validate(&self, require_remote: bool) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            bail!("pipeline.concurrency must be >= 1");
        }
        if self.pipeline.max_attempts == 0 {
            bail!("pipeline.max_attempts must be >= 1");
        }
        if self.pipeline.base_delay_ms > self.pipeline.max_delay_ms {
            bail!("pipeline.base_delay_ms must not exceed pipeline.max_delay_ms");
        }
        if self.pipeline.timeout_secs == 0 {
            bail!("pipeline.timeout_secs must be > 0");
        }

        if !require_remote {
            return Ok(());
        }

        check_addr("node.addr", "HANZO_NODE_ADDR", &self.node.addr)?;
        check_addr("store.addr", "HANZO_STORE_ADDR", &self.store.addr)?;
        if self.node.token.trim().is_empty() {
            bail!("node.token is required (set it in the config file or via BEARER_TOKEN)");
        }
        if self.store.token.trim().is_empty() {
            bail!("store.token is required (set it in the config file or via HANZO_STORE_TOKEN)");
        }
        Ok(())
    }
}

fn check_addr(field: &str, env: &str, addr: &str) -> Result<()> {
    if addr.trim().is_empty() {
        bail!("{} is required (set it in the config file or via {})", field, env);
    }
    if !(addr.starts_with("http://") || addr.starts_with("https://")) {
        bail!("{} must be an http(s) URL, got '{}'", field, addr);
    }
    Ok(())
}

/// Parse configuration text, expanding `${VAR}` with `lookup`.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    for value in [
        &mut config.node.addr,
        &mut config.node.token,
        &mut config.store.addr,
        &mut config.store.token,
    ] {
        *value = expand_env_vars(value, &lookup);
    }
    Ok(config)
}

/// Load configuration from `path` and the process environment.
///
/// An explicit `path` must exist. Without one, `./toolpress.toml` is used
/// when present and defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let lookup = |key: &str| std::env::var(key).ok();

    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {}", p.display()))?;
            parse_config(&content, lookup)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            let content = std::fs::read_to_string(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("Failed to read config file: {}", DEFAULT_CONFIG_PATH))?;
            parse_config(&content, lookup)?
        }
        None => Config::default(),
    };

    config.apply_env_overrides(lookup);
    Ok(config)
}

/// Expand `${VAR_NAME}` patterns; unknown variables expand to "".
///
/// Substituted values are copied verbatim and never expanded again.
fn expand_env_vars<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let end = match rest[start..].find('}') {
            Some(pos) => start + pos,
            None => break,
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..end];
        result.push_str(&lookup(var_name).unwrap_or_default());
        rest = &rest[end + 1..];
    }
    result.push_str(rest);
    result
}
