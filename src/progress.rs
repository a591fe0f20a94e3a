//! Pipeline progress reporting.
//!
//! The orchestrator emits discrete [`PipelineEvent`]s as stages start and
//! finish; how they are shown is up to the [`ProgressReporter`]. Progress
//! goes to **stdout** (human or one JSON object per line) so a CI log shows
//! each stage of the run. Diagnostics go through `tracing` on stderr.

use serde::Serialize;
use std::fmt;
use std::io::Write;

use crate::models::ItemKind;

/// Stages of one collection run, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scanning,
    Validating,
    Archiving,
    Registering,
    Uploading,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Scanning => "scanning",
            Stage::Validating => "validating",
            Stage::Archiving => "archiving",
            Stage::Registering => "registering",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// A stage began with `items` inputs.
    StageStarted {
        kind: ItemKind,
        stage: Stage,
        items: u64,
    },
    /// A stage finished; `ok + failed` equals the stage's inputs.
    StageFinished {
        kind: ItemKind,
        stage: Stage,
        ok: u64,
        failed: u64,
    },
    /// An item was dropped from the run.
    ItemFailed {
        kind: ItemKind,
        name: String,
        stage: Stage,
        detail: String,
    },
}

/// Receives pipeline events. Implementations must be cheap and non-blocking.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: PipelineEvent);
}

/// Human-friendly lines: `tools  archiving      3 ok, 1 failed`.
pub struct HumanProgress;

impl ProgressReporter for HumanProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::StageStarted { kind, stage, items } => format!(
                "{:<7} {:<12} {} item(s)\n",
                kind.collection(),
                stage.to_string(),
                format_number(*items)
            ),
            PipelineEvent::StageFinished {
                kind,
                stage,
                ok,
                failed,
            } => format!(
                "{:<7} {:<12} {} ok, {} failed\n",
                kind.collection(),
                stage.to_string(),
                format_number(*ok),
                format_number(*failed)
            ),
            PipelineEvent::ItemFailed {
                kind,
                name,
                stage,
                detail,
            } => format!(
                "{:<7} {:<12} FAILED {}: {}\n",
                kind.collection(),
                stage.to_string(),
                name,
                detail
            ),
        };
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

fn event_json(event: &PipelineEvent) -> serde_json::Value {
    match event {
        PipelineEvent::StageStarted { kind, stage, items } => serde_json::json!({
            "event": "stage_started",
            "kind": kind,
            "stage": stage,
            "items": items,
        }),
        PipelineEvent::StageFinished {
            kind,
            stage,
            ok,
            failed,
        } => serde_json::json!({
            "event": "stage_finished",
            "kind": kind,
            "stage": stage,
            "ok": ok,
            "failed": failed,
        }),
        PipelineEvent::ItemFailed {
            kind,
            name,
            stage,
            detail,
        } => serde_json::json!({
            "event": "item_failed",
            "kind": kind,
            "name": name,
            "stage": stage,
            "detail": detail,
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stdout is a TTY, JSON otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stdout) {
            ProgressMode::Human
        } else {
            ProgressMode::Json
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(HumanProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
