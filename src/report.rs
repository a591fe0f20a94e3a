//! Run reports.
//!
//! A [`CollectionReport`] is produced for each collection when it reaches
//! `Done`; a [`RunReport`] groups them and decides the exit status.

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{ItemKind, UploadResult};
use crate::progress::Stage;
use crate::scanner::ExcludedDir;

/// Final per-collection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Subdirectories seen at scan time, qualifying or not.
    pub found: u64,
    pub excluded: u64,
    pub validated: u64,
    pub archived: u64,
    pub registered: u64,
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl Counts {
    /// Items that made it through node registration.
    pub fn processed(&self) -> u64 {
        self.registered
    }
}

/// Counters shared by concurrent stage workers.
#[derive(Debug, Default)]
pub struct Counters {
    pub found: AtomicU64,
    pub excluded: AtomicU64,
    pub validated: AtomicU64,
    pub archived: AtomicU64,
    pub registered: AtomicU64,
    pub uploaded: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Counts {
        Counts {
            found: self.found.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            validated: self.validated.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// An item dropped from the run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub kind: ItemKind,
    /// Item name, or the directory name when the item never got one.
    pub name: String,
    pub stage: Stage,
    pub detail: String,
}

/// A directory skipped at scan time.
#[derive(Debug, Clone, Serialize)]
pub struct Exclusion {
    pub path: PathBuf,
    pub reason: String,
}

impl From<ExcludedDir> for Exclusion {
    fn from(e: ExcludedDir) -> Self {
        Self {
            path: e.path,
            reason: e.reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub kind: ItemKind,
    pub counts: Counts,
    pub failures: Vec<ItemFailure>,
    pub excluded: Vec<Exclusion>,
    pub uploads: Vec<UploadResult>,
    pub dry_run: bool,
}

impl CollectionReport {
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    /// Failures at `stage`, by name.
    pub fn failed_at(&self, stage: Stage) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| f.stage == stage)
            .map(|f| f.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub collections: Vec<CollectionReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.collections.iter().any(CollectionReport::has_failures)
    }

    pub fn collection(&self, kind: ItemKind) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.kind == kind)
    }

    /// Write the human summary: counts, exclusions and every failure.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out)?;
        writeln!(out, "Summary")?;
        writeln!(out, "=======")?;
        for c in &self.collections {
            let n = &c.counts;
            writeln!(
                out,
                "{:<7} found={} excluded={} validated={} archived={} registered={} uploaded={} skipped={} failed={}{}",
                c.kind.collection(),
                n.found,
                n.excluded,
                n.validated,
                n.archived,
                n.registered,
                n.uploaded,
                n.skipped,
                n.failed,
                if c.dry_run { " (dry-run)" } else { "" }
            )?;
            for e in &c.excluded {
                writeln!(out, "  excluded  {}  ({})", e.path.display(), e.reason)?;
            }
            for r in c
                .uploads
                .iter()
                .filter(|r| r.status == crate::models::UploadStatus::SkippedExists)
            {
                writeln!(out, "  skipped   {}  (already in store)", r.name)?;
            }
            for f in &c.failures {
                writeln!(out, "  failed    {}  [{}] {}", f.name, f.stage, f.detail)?;
            }
        }
        let status = if self.has_failures() { "FAILED" } else { "ok" };
        writeln!(out, "result: {}", status)?;
        Ok(())
    }
}
