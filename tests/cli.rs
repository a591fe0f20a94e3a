mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use common::{FakeRemote, NODE_TOKEN, STORE_TOKEN};

fn toolpress_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_toolpress"))
}

/// Run the binary in `cwd` with a clean remote environment.
fn toolpress(cwd: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let binary = toolpress_binary();
    let mut cmd = Command::new(&binary);
    cmd.current_dir(cwd)
        .args(args)
        .env_remove("HANZO_NODE_ADDR")
        .env_remove("HANZO_STORE_ADDR")
        .env_remove("HANZO_STORE_TOKEN")
        .env_remove("BEARER_TOKEN")
        .env_remove("TOOLPRESS_LOG");
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output()
        .unwrap_or_else(|e| panic!("Failed to run toolpress binary at {:?}: {}", binary, e))
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

async fn toolpress_async(cwd: PathBuf, args: Vec<String>, env: Vec<(String, String)>) -> Output {
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let env: Vec<(&str, &str)> = env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        toolpress(&cwd, &args, &env)
    })
    .await
    .unwrap()
}

fn remote_env(addr: &str) -> Vec<(String, String)> {
    vec![
        ("HANZO_NODE_ADDR".to_string(), addr.to_string()),
        ("HANZO_STORE_ADDR".to_string(), addr.to_string()),
        ("BEARER_TOKEN".to_string(), NODE_TOKEN.to_string()),
        ("HANZO_STORE_TOKEN".to_string(), STORE_TOKEN.to_string()),
    ]
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_help() {
    let output = toolpress(Path::new("."), &["--help"], &[]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("publish"));
    assert!(text.contains("scan"));
    assert!(text.contains("pack"));
}

#[test]
fn test_scan_lists_items_and_exclusions() {
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "echo");
    common::write_agent(tmp.path(), "planner", "planner");
    fs::create_dir_all(tmp.path().join("tools/scratch")).unwrap();

    let output = toolpress(tmp.path(), &["scan"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("tools (1 valid, 1 excluded, 0 invalid)"), "{}", text);
    assert!(text.contains("agents (1 valid, 0 excluded, 0 invalid)"), "{}", text);
    assert!(text.contains("echo"));
    assert!(text.contains("planner"));
    assert!(text.contains("scratch"));
}

#[test]
fn test_scan_fails_on_invalid_metadata() {
    let tmp = common::source_tree();
    let dir = tmp.path().join("tools/nameless");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("tool.py"), "def run(): pass\n").unwrap();
    fs::write(dir.join("metadata.json"), r#"{"description":"x"}"#).unwrap();

    let output = toolpress(tmp.path(), &["scan", "--only", "tools"], &[]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("invalid"));
    assert!(text.contains("`name`"), "{}", text);
    assert!(!text.contains("agents"));
}

#[test]
fn test_scan_missing_collection_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = toolpress(tmp.path(), &["scan"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"), "{}", stderr(&output));
}

#[test]
fn test_pack_is_deterministic() {
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "Echo");
    let out = tmp.path().join("echo.zip");

    let first = toolpress(
        tmp.path(),
        &["pack", "tools/echo", "--out", out.to_str().unwrap()],
        &[],
    );
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    assert!(out.is_file());
    let second = toolpress(tmp.path(), &["pack", "tools/echo"], &[]);

    let digest = |o: &Output| {
        stdout(o)
            .lines()
            .find(|l| l.starts_with("digest:"))
            .map(|l| l.to_string())
            .unwrap()
    };
    assert_eq!(digest(&first), digest(&second));
    assert!(stdout(&first).contains("files:  2"));
    assert!(stdout(&first).contains("kind:   tool"));
}

#[test]
fn test_pack_infers_agents_and_rejects_incomplete_dirs() {
    let tmp = common::source_tree();
    common::write_agent(tmp.path(), "planner", "planner");
    let output = toolpress(tmp.path(), &["pack", "agents/planner"], &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("kind:   agent"));

    fs::create_dir_all(tmp.path().join("tools/empty")).unwrap();
    let output = toolpress(tmp.path(), &["pack", "tools/empty"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not a tool"));
}

#[test]
fn test_publish_dry_run_needs_no_credentials() {
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "Echo Tool");
    common::write_agent(tmp.path(), "planner", "planner");

    let output = toolpress(
        tmp.path(),
        &["publish", "--dry-run", "--progress", "off", "--out-dir", "dist"],
        &[],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("archived=1"));
    assert!(text.contains("(dry-run)"));
    assert!(text.contains("result: ok"));
    assert!(tmp.path().join("dist/tools/echo-tool.zip").is_file());
    assert!(tmp.path().join("dist/agents/planner.zip").is_file());
}

#[test]
fn test_publish_without_credentials_fails_at_startup() {
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "echo");

    let output = toolpress(tmp.path(), &["publish", "--progress", "off"], &[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("store.addr"), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_explicit_config_file_is_used() {
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "echo");
    let config = tmp.path().join("custom.toml");
    fs::write(&config, "[pipeline]\nconcurrency = 0\n").unwrap();

    let output = toolpress(
        tmp.path(),
        &["--config", config.to_str().unwrap(), "publish", "--dry-run"],
        &[],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("concurrency"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_against_remote() {
    let remote = FakeRemote::default();
    let addr = remote.spawn().await;
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "echo");
    fs::create_dir_all(tmp.path().join("tools/half")).unwrap();
    fs::write(tmp.path().join("tools/half/tool.ts"), "//").unwrap();

    let output = toolpress_async(
        tmp.path().to_path_buf(),
        args(&["publish", "--progress", "json"]),
        remote_env(&addr),
    )
    .await;
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(
        text.contains(
            "found=2 excluded=1 validated=1 archived=1 registered=1 uploaded=1 skipped=0 failed=0"
        ),
        "{}",
        text
    );
    assert!(text.contains(r#""event":"stage_finished""#));
    assert!(text.contains("half"));

    // Second run: the store already has the archive.
    let output = toolpress_async(
        tmp.path().to_path_buf(),
        args(&["publish", "--only", "tools", "--progress", "off"]),
        remote_env(&addr),
    )
    .await;
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("skipped=1"));
    assert_eq!(remote.node_record_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_exits_nonzero_when_an_item_fails() {
    let remote = FakeRemote::failing(&["broken"]);
    let addr = remote.spawn().await;
    let tmp = common::source_tree();
    common::write_tool(tmp.path(), "echo", "echo");
    common::write_tool(tmp.path(), "broken", "broken");
    fs::write(
        tmp.path().join("toolpress.toml"),
        "[pipeline]\nbase_delay_ms = 1\nmax_delay_ms = 2\n",
    )
    .unwrap();

    let output = toolpress_async(
        tmp.path().to_path_buf(),
        args(&["publish", "--progress", "off"]),
        remote_env(&addr),
    )
    .await;
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("failed    broken  [registering]"), "{}", text);
    assert!(text.contains("uploaded=1"));
    assert!(text.contains("result: FAILED"));
}
