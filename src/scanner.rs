//! Directory scanner.
//!
//! Walks the immediate subdirectories of a collection root and yields one
//! entry per directory. A directory is a candidate only if it holds both a
//! recognized entry file for its kind and a `metadata.json`; anything else is
//! reported as an exclusion, never as an error.
//!
//! ```text
//! tools/
//!   download-page/
//!     tool.ts
//!     metadata.json     ← candidate
//!   scratch/
//!     notes.md          ← excluded (missing entry + metadata)
//! ```
//!
//! Enumeration order is whatever the filesystem returns.

use std::fs::ReadDir;
use std::path::{Path, PathBuf};

use crate::error::{ScanError, ValidationError};
use crate::models::{ItemKind, METADATA_FILE};

/// A directory that looks like an item.
#[derive(Debug, Clone)]
pub struct ItemDir {
    pub kind: ItemKind,
    pub path: PathBuf,
    pub dir_name: String,
    pub entry_file: PathBuf,
    pub metadata_file: PathBuf,
}

/// Why a subdirectory was not treated as an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    MissingMetadata,
    MissingEntry,
    MissingBoth,
    Unreadable(String),
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::MissingMetadata => write!(f, "no {}", METADATA_FILE),
            ExclusionReason::MissingEntry => f.write_str("no entry file"),
            ExclusionReason::MissingBoth => {
                write!(f, "no entry file and no {}", METADATA_FILE)
            }
            ExclusionReason::Unreadable(msg) => write!(f, "unreadable: {}", msg),
        }
    }
}

/// A subdirectory skipped at scan time.
#[derive(Debug, Clone)]
pub struct ExcludedDir {
    pub path: PathBuf,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone)]
pub enum ScanEntry {
    Candidate(ItemDir),
    Excluded(ExcludedDir),
}

/// Lazy iterator over a collection root.
pub struct ScanIter {
    kind: ItemKind,
    inner: ReadDir,
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        for entry in self.inner.by_ref() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !path.is_dir() {
                continue;
            }
            return Some(classify(self.kind, path, name));
        }
        None
    }
}

/// Start scanning `root` for items of `kind`.
///
/// Fails only when `root` itself is missing, not a directory, or cannot be
/// listed.
pub fn scan(root: &Path, kind: ItemKind) -> Result<ScanIter, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let inner = std::fs::read_dir(root).map_err(|source| ScanError::Unlistable {
        path: root.to_path_buf(),
        source,
    })?;
    Ok(ScanIter { kind, inner })
}

/// Classify a single item directory, outside of any collection scan.
pub fn inspect(path: &Path, kind: ItemKind) -> ScanEntry {
    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    if !path.is_dir() {
        return ScanEntry::Excluded(ExcludedDir {
            path: path.to_path_buf(),
            reason: ExclusionReason::Unreadable("not a directory".to_string()),
        });
    }
    classify(kind, path.to_path_buf(), dir_name)
}

fn classify(kind: ItemKind, path: PathBuf, dir_name: String) -> ScanEntry {
    let entry_file = kind
        .entry_files()
        .iter()
        .map(|f| path.join(f))
        .find(|p| p.is_file());
    let metadata_file = path.join(METADATA_FILE);
    let has_metadata = metadata_file.is_file();

    let reason = match (&entry_file, has_metadata) {
        (Some(entry_file), true) => {
            return ScanEntry::Candidate(ItemDir {
                kind,
                entry_file: entry_file.clone(),
                metadata_file,
                path,
                dir_name,
            })
        }
        (Some(_), false) => ExclusionReason::MissingMetadata,
        (None, true) => ExclusionReason::MissingEntry,
        (None, false) => ExclusionReason::MissingBoth,
    };
    tracing::debug!("excluding {}: {}", path.display(), reason);
    ScanEntry::Excluded(ExcludedDir { path, reason })
}

/// Raw file contents of a candidate, ready for validation.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub dir: ItemDir,
    pub metadata_text: String,
    pub entry_content: String,
}

/// Read the metadata descriptor and entry file of a candidate.
pub fn load(dir: ItemDir) -> Result<RawItem, ValidationError> {
    let metadata_text = read_item_file(&dir, &dir.metadata_file)?;
    let entry_content = read_item_file(&dir, &dir.entry_file)?;
    Ok(RawItem {
        dir,
        metadata_text,
        entry_content,
    })
}

fn read_item_file(dir: &ItemDir, file: &Path) -> Result<String, ValidationError> {
    std::fs::read_to_string(file).map_err(|e| ValidationError::Unreadable {
        path: dir.path.clone(),
        file: file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        message: e.to_string(),
    })
}
