//! Pipeline orchestration.
//!
//! Runs each collection (tools, then agents) through the stages
//!
//! ```text
//! Scanning → Validating → Archiving → Registering → Uploading → Done
//! ```
//!
//! Every stage consumes the whole output of the previous one before the next
//! begins. An item that fails is recorded with its stage and dropped; the
//! rest of the batch carries on. Archiving, Registering and Uploading work on
//! items concurrently, bounded by `concurrency`. Only a [`ScanError`] stops
//! the run.
//!
//! Dropping the future returned by [`Pipeline::run`] aborts every in-flight
//! worker, which is how the CLI handles an interrupt.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::archive::{self, ArchiveOptions};
use crate::config::{Config, PipelineConfig};
use crate::error::{ScanError, UploadError, ValidationError};
use crate::models::{Item, ItemKind, PackagedItem, RegisteredItem, UploadResult, UploadStatus};
use crate::node::{NodeApi, NodeClient};
use crate::progress::{PipelineEvent, ProgressReporter, Stage};
use crate::report::{CollectionReport, Counters, Exclusion, ItemFailure, RunReport};
use crate::retry::RetryPolicy;
use crate::scanner::{self, ScanEntry, ScanIter};
use crate::store::{StoreApi, StoreClient};
use crate::validate::{check_collisions, validate};

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory containing `tools/` and `agents/`.
    pub root: PathBuf,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub archive: ArchiveOptions,
    /// Stop after Archiving; no network calls.
    pub dry_run: bool,
    /// Restrict the run to one collection.
    pub only: Option<ItemKind>,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            root: config.root.clone(),
            concurrency: config.concurrency.max(1),
            retry: config.retry_policy(),
            archive: ArchiveOptions {
                exclude_globs: config.exclude_globs.clone(),
                output_dir: config.output_dir.clone(),
            },
            dry_run: false,
            only: None,
        }
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    node: Arc<dyn NodeApi>,
    store: Arc<dyn StoreApi>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        node: Arc<dyn NodeApi>,
        store: Arc<dyn StoreApi>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            settings,
            node,
            store,
            reporter,
        }
    }

    /// Build a pipeline talking to the node and store named in `config`.
    pub fn from_config(
        config: &Config,
        settings: PipelineSettings,
        reporter: Arc<dyn ProgressReporter>,
    ) -> anyhow::Result<Self> {
        let timeout = config.pipeline.timeout();
        let node = NodeClient::new(config.node.clone(), timeout)?;
        let store = StoreClient::new(config.store.clone(), timeout)?;
        Ok(Self::new(settings, Arc::new(node), Arc::new(store), reporter))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every selected collection, tools first.
    ///
    /// Every selected collection root is opened before any stage runs, so a
    /// missing root fails the run before anything is published.
    pub async fn run(&self) -> Result<RunReport, ScanError> {
        let mut scans = Vec::new();
        for kind in ItemKind::ALL {
            if self.settings.only.is_some_and(|only| only != kind) {
                continue;
            }
            let root = self.settings.root.join(kind.collection());
            scans.push((kind, scanner::scan(&root, kind)?));
        }

        let mut report = RunReport::default();
        for (kind, entries) in scans {
            report
                .collections
                .push(self.run_entries(kind, entries).await);
        }
        Ok(report)
    }

    /// Run one collection rooted at `root` through every stage.
    pub async fn run_collection(
        &self,
        kind: ItemKind,
        root: &Path,
    ) -> Result<CollectionReport, ScanError> {
        let entries = scanner::scan(root, kind)?;
        Ok(self.run_entries(kind, entries).await)
    }

    async fn run_entries(&self, kind: ItemKind, entries: ScanIter) -> CollectionReport {
        let mut run = CollectionRun::new(kind, self.reporter.clone());

        // Scanning
        run.started(Stage::Scanning, 0);
        let mut candidates = Vec::new();
        let mut excluded: Vec<Exclusion> = Vec::new();
        for entry in entries {
            Counters::bump(&run.counters.found);
            match entry {
                ScanEntry::Candidate(dir) => candidates.push(dir),
                ScanEntry::Excluded(dir) => {
                    Counters::bump(&run.counters.excluded);
                    excluded.push(dir.into());
                }
            }
        }
        excluded.sort_by(|a, b| a.path.cmp(&b.path));
        run.finished(Stage::Scanning, candidates.len());

        // Validating
        run.started(Stage::Validating, candidates.len());
        let mut valid = Vec::with_capacity(candidates.len());
        for dir in candidates {
            let dir_name = dir.dir_name.clone();
            match scanner::load(dir).and_then(validate) {
                Ok(item) => valid.push(item),
                Err(e) => run.fail(dir_name, Stage::Validating, e.to_string()),
            }
        }
        let (items, collisions) = check_collisions(valid);
        for e in collisions {
            let name = match &e {
                ValidationError::NameCollision { name, .. }
                | ValidationError::FileNameCollision { name, .. } => name.clone(),
                other => other.path().display().to_string(),
            };
            run.fail(name, Stage::Validating, e.to_string());
        }
        for _ in &items {
            Counters::bump(&run.counters.validated);
        }
        run.finished(Stage::Validating, items.len());

        // Archiving
        let packaged = self.archive_stage(&mut run, items).await;

        let uploads = if self.settings.dry_run {
            Vec::new()
        } else {
            let registered = self.register_stage(&mut run, packaged).await;
            self.upload_stage(&mut run, registered).await
        };

        let report = CollectionReport {
            kind,
            counts: run.counters.snapshot(),
            failures: run.failures,
            excluded,
            uploads,
            dry_run: self.settings.dry_run,
        };
        self.reporter.report(PipelineEvent::StageFinished {
            kind,
            stage: Stage::Done,
            ok: report.counts.processed(),
            failed: report.counts.failed,
        });
        report
    }

    async fn archive_stage(&self, run: &mut CollectionRun, items: Vec<Item>) -> Vec<PackagedItem> {
        run.started(Stage::Archiving, items.len());
        let options = self.settings.archive.clone();
        let counters = run.counters.clone();
        let inputs = items.into_iter().map(|i| (i.name.clone(), i)).collect();

        let output = run_bounded(self.settings.concurrency, inputs, move |item: Item| {
            let options = options.clone();
            let counters = counters.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || archive::archive(item, &options))
                    .await
                    .map_err(|e| format!("archive task failed: {}", e))
                    .and_then(|r| r.map_err(|e| e.to_string()));
                if result.is_ok() {
                    Counters::bump(&counters.archived);
                }
                result
            }
        })
        .await;

        let mut packaged = Vec::with_capacity(output.done.len());
        for (name, result) in output.done {
            match result {
                Ok(p) => packaged.push(p),
                Err(detail) => run.fail(name, Stage::Archiving, detail),
            }
        }
        run.lost(output.lost, Stage::Archiving);
        run.finished(Stage::Archiving, packaged.len());
        packaged
    }

    async fn register_stage(
        &self,
        run: &mut CollectionRun,
        packaged: Vec<PackagedItem>,
    ) -> Vec<RegisteredItem> {
        run.started(Stage::Registering, packaged.len());
        let node = self.node.clone();
        let retry = self.settings.retry;
        let counters = run.counters.clone();
        let inputs = packaged
            .into_iter()
            .map(|p| (p.item.name.clone(), p))
            .collect();

        let output = run_bounded(self.settings.concurrency, inputs, move |p: PackagedItem| {
            let node = node.clone();
            let counters = counters.clone();
            async move {
                let label = format!("register {} '{}'", p.item.kind, p.item.name);
                let result = retry.run(&label, || node.register(&p)).await;
                if result.is_ok() {
                    Counters::bump(&counters.registered);
                }
                result.map_err(|e| e.to_string())
            }
        })
        .await;

        let mut registered = Vec::with_capacity(output.done.len());
        for (name, result) in output.done {
            match result {
                Ok(r) => registered.push(r),
                Err(detail) => run.fail(name, Stage::Registering, detail),
            }
        }
        run.lost(output.lost, Stage::Registering);
        run.finished(Stage::Registering, registered.len());
        registered
    }

    async fn upload_stage(
        &self,
        run: &mut CollectionRun,
        registered: Vec<RegisteredItem>,
    ) -> Vec<UploadResult> {
        run.started(Stage::Uploading, registered.len());
        let store = self.store.clone();
        let retry = self.settings.retry;
        let counters = run.counters.clone();
        let inputs = registered
            .into_iter()
            .map(|r| (r.item().name.clone(), r))
            .collect();

        let output = run_bounded(self.settings.concurrency, inputs, move |r: RegisteredItem| {
            let store = store.clone();
            let counters = counters.clone();
            async move {
                let label = format!("upload {} '{}'", r.item().kind, r.item().name);
                let outcome = retry.run(&label, || store.upload(&r)).await;
                let (status, remote_id, error_detail) = match outcome {
                    Ok(remote_id) => {
                        Counters::bump(&counters.uploaded);
                        (UploadStatus::Uploaded, remote_id, None)
                    }
                    Err(UploadError::AlreadyExists) => {
                        Counters::bump(&counters.skipped);
                        (UploadStatus::SkippedExists, None, None)
                    }
                    Err(e) => (UploadStatus::Failed, None, Some(e.to_string())),
                };
                UploadResult {
                    name: r.item().name.clone(),
                    kind: r.item().kind,
                    digest: r.packaged().archive_digest.clone(),
                    status,
                    remote_id,
                    error_detail,
                }
            }
        })
        .await;

        let mut results = Vec::with_capacity(output.done.len());
        let mut ok = 0;
        for (name, result) in output.done {
            match (&result.status, &result.error_detail) {
                (UploadStatus::Failed, detail) => run.fail(
                    name,
                    Stage::Uploading,
                    detail.clone().unwrap_or_else(|| "upload failed".to_string()),
                ),
                _ => ok += 1,
            }
            results.push(result);
        }
        run.lost(output.lost, Stage::Uploading);
        run.finished(Stage::Uploading, ok);
        results
    }
}

/// Mutable bookkeeping for one collection.
struct CollectionRun {
    kind: ItemKind,
    counters: Arc<Counters>,
    failures: Vec<ItemFailure>,
    reporter: Arc<dyn ProgressReporter>,
}

impl CollectionRun {
    fn new(kind: ItemKind, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            kind,
            counters: Arc::new(Counters::default()),
            failures: Vec::new(),
            reporter,
        }
    }

    fn started(&self, stage: Stage, items: usize) {
        self.reporter.report(PipelineEvent::StageStarted {
            kind: self.kind,
            stage,
            items: items as u64,
        });
    }

    fn finished(&self, stage: Stage, ok: usize) {
        let failed = self.failures.iter().filter(|f| f.stage == stage).count();
        self.reporter.report(PipelineEvent::StageFinished {
            kind: self.kind,
            stage,
            ok: ok as u64,
            failed: failed as u64,
        });
    }

    fn fail(&mut self, name: String, stage: Stage, detail: String) {
        tracing::debug!("{} '{}' failed at {}: {}", self.kind, name, stage, detail);
        Counters::bump(&self.counters.failed);
        self.reporter.report(PipelineEvent::ItemFailed {
            kind: self.kind,
            name: name.clone(),
            stage,
            detail: detail.clone(),
        });
        self.failures.push(ItemFailure {
            kind: self.kind,
            name,
            stage,
            detail,
        });
    }

    fn lost(&mut self, names: Vec<String>, stage: Stage) {
        for name in names {
            self.fail(name, stage, "worker task aborted".to_string());
        }
    }
}

/// Results of a bounded stage, keyed by item name and sorted by it.
struct StageOutput<T> {
    done: Vec<(String, T)>,
    /// Items whose worker panicked or was aborted.
    lost: Vec<String>,
}

/// Run `work` over `inputs` with at most `limit` in flight.
///
/// Workers live in a [`JoinSet`], so dropping this future aborts them.
async fn run_bounded<I, T, F, Fut>(limit: usize, inputs: Vec<(String, I)>, work: F) -> StageOutput<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut pending: BTreeSet<String> = BTreeSet::new();
    let mut set = JoinSet::new();

    for (name, input) in inputs {
        pending.insert(name.clone());
        let semaphore = semaphore.clone();
        let fut = work(input);
        set.spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = semaphore.acquire_owned().await.ok();
            (name, fut.await)
        });
    }

    let mut done = Vec::with_capacity(pending.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, value)) => {
                pending.remove(&name);
                done.push((name, value));
            }
            Err(e) => tracing::error!("pipeline worker failed: {}", e),
        }
    }
    done.sort_by(|a, b| a.0.cmp(&b.0));

    StageOutput {
        done,
        lost: pending.into_iter().collect(),
    }
}
