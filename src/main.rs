//! # Toolpress CLI (`toolpress`)
//!
//! Publishes the `tools/` and `agents/` collections of a source tree to the
//! local node and the remote store.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `toolpress publish` | Scan, validate, archive, register and upload |
//! | `toolpress scan` | Scan and validate only; list items and exclusions |
//! | `toolpress pack <DIR>` | Archive a single item directory |
//!
//! ## Examples
//!
//! ```bash
//! # Validate and pack everything, write zips to ./dist, no network
//! toolpress publish --dry-run --out-dir dist
//!
//! # Publish only the agents, one request at a time
//! toolpress publish --only agents --concurrency 1
//!
//! # Inspect a single tool
//! toolpress pack tools/download-page --out download-page.zip
//! ```
//!
//! Exit status: `0` when every item succeeded, `1` when any item failed or
//! the run could not start, `130` when interrupted.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toolpress::archive::{self, ArchiveOptions};
use toolpress::config::{self, Config};
use toolpress::logging;
use toolpress::models::ItemKind;
use toolpress::pipeline::{Pipeline, PipelineSettings};
use toolpress::progress::{ProgressMode, ProgressReporter};
use toolpress::scanner::{self, ScanEntry};
use toolpress::validate::{check_collisions, validate};

const EXIT_INTERRUPTED: i32 = 130;

/// Toolpress: build and publish tool and agent packages.
#[derive(Parser)]
#[command(name = "toolpress", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./toolpress.toml` when it exists; every setting has a
    /// default, so the file is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug diagnostics to stderr (overridden by `TOOLPRESS_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for tools and agents.
    ///
    /// Prints stage progress and a summary on stdout. Exits 1 if any item
    /// failed at any stage.
    Publish {
        /// Only publish one collection (`tools` or `agents`).
        #[arg(long)]
        only: Option<ItemKind>,

        /// Stop after archiving: no node or store calls, no credentials needed.
        #[arg(long)]
        dry_run: bool,

        /// Also write every archive to `<DIR>/<collection>/<name>.zip`.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Directory containing `tools/` and `agents/` (overrides `pipeline.root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Items processed concurrently per stage (overrides `pipeline.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Progress output. Defaults to `human` on a terminal, `json` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Scan and validate without archiving or publishing.
    ///
    /// Lists valid items, excluded directories and validation failures.
    /// Exits 1 if any item fails validation.
    Scan {
        /// Only scan one collection (`tools` or `agents`).
        #[arg(long)]
        only: Option<ItemKind>,

        /// Directory containing `tools/` and `agents/`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Archive a single item directory and print its digest.
    Pack {
        /// The item directory.
        dir: PathBuf,

        /// Item kind. Inferred from the entry file when omitted.
        #[arg(long)]
        kind: Option<ItemKind>,

        /// Write the archive to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    let ok = match cli.command {
        Commands::Publish {
            only,
            dry_run,
            out_dir,
            root,
            concurrency,
            progress,
        } => {
            let mut config = config;
            if let Some(root) = root {
                config.pipeline.root = root;
            }
            if let Some(n) = concurrency {
                config.pipeline.concurrency = n;
            }
            if out_dir.is_some() {
                config.pipeline.output_dir = out_dir;
            }
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_publish(&config, only, dry_run, mode).await?
        }
        Commands::Scan { only, root } => {
            let root = root.unwrap_or_else(|| config.pipeline.root.clone());
            run_scan(&root, only)?
        }
        Commands::Pack { dir, kind, out } => {
            run_pack(&config, &dir, kind, out.as_deref())?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_publish(
    config: &Config,
    only: Option<ItemKind>,
    dry_run: bool,
    mode: ProgressMode,
) -> anyhow::Result<bool> {
    config.validate(!dry_run)?;

    let mut settings = PipelineSettings::from_config(&config.pipeline);
    settings.dry_run = dry_run;
    settings.only = only;

    let reporter: Arc<dyn ProgressReporter> = Arc::from(mode.reporter());
    let pipeline = Pipeline::from_config(config, settings, reporter)?;

    let report = tokio::select! {
        result = pipeline.run() => result.context("Scan failed")?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted; in-flight requests abandoned.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    let mut out = std::io::stdout().lock();
    report.write_summary(&mut out)?;
    out.flush()?;
    Ok(!report.has_failures())
}

fn run_scan(root: &Path, only: Option<ItemKind>) -> anyhow::Result<bool> {
    let mut ok = true;
    let mut out = std::io::stdout().lock();

    for kind in ItemKind::ALL {
        if only.is_some_and(|k| k != kind) {
            continue;
        }
        let collection_root = root.join(kind.collection());
        let mut valid = Vec::new();
        let mut failures = Vec::new();
        let mut excluded = Vec::new();

        for entry in scanner::scan(&collection_root, kind)? {
            match entry {
                ScanEntry::Candidate(dir) => match scanner::load(dir).and_then(validate) {
                    Ok(item) => valid.push(item),
                    Err(e) => failures.push(e),
                },
                ScanEntry::Excluded(e) => excluded.push(e),
            }
        }
        let (mut items, collisions) = check_collisions(valid);
        failures.extend(collisions);
        items.sort_by(|a, b| a.name.cmp(&b.name));
        excluded.sort_by(|a, b| a.path.cmp(&b.path));

        writeln!(
            out,
            "{} ({} valid, {} excluded, {} invalid)",
            kind.collection(),
            items.len(),
            excluded.len(),
            failures.len()
        )?;
        for item in &items {
            writeln!(
                out,
                "  {:<32} {}",
                item.name,
                item.source_path.display()
            )?;
        }
        for e in &excluded {
            writeln!(out, "  excluded  {}  ({})", e.path.display(), e.reason)?;
        }
        for e in &failures {
            writeln!(out, "  invalid   {}", e)?;
        }
        if !failures.is_empty() {
            ok = false;
        }
    }
    Ok(ok)
}

fn run_pack(
    config: &Config,
    dir: &Path,
    kind: Option<ItemKind>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let kind = kind.unwrap_or_else(|| infer_kind(dir));
    let candidate = match scanner::inspect(dir, kind) {
        ScanEntry::Candidate(c) => c,
        ScanEntry::Excluded(e) => bail!("{} is not a {}: {}", dir.display(), kind, e.reason),
    };
    let item = scanner::load(candidate).and_then(validate)?;

    let options = ArchiveOptions {
        exclude_globs: config.pipeline.exclude_globs.clone(),
        output_dir: None,
    };
    let packaged = archive::archive(item, &options)?;

    if let Some(path) = out {
        std::fs::write(path, &packaged.archive_bytes)
            .with_context(|| format!("Failed to write archive: {}", path.display()))?;
    }

    println!("name:   {}", packaged.item.name);
    println!("kind:   {}", packaged.item.kind);
    println!("files:  {}", packaged.file_count);
    println!("bytes:  {}", packaged.archive_bytes.len());
    println!("digest: {}", packaged.archive_digest);
    if let Some(path) = out {
        println!("wrote:  {}", path.display());
    }
    Ok(())
}

/// An `agent.json` makes an agent; anything else is treated as a tool.
fn infer_kind(dir: &Path) -> ItemKind {
    let is_agent = ItemKind::Agent
        .entry_files()
        .iter()
        .any(|f| dir.join(f).is_file());
    if is_agent {
        ItemKind::Agent
    } else {
        ItemKind::Tool
    }
}
