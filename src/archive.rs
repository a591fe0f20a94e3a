//! Deterministic item archives.
//!
//! Every regular file under an item directory is collected, sorted by its
//! `/`-separated relative path and written into a zip with fixed timestamps
//! and permissions. The content digest is a SHA-256 over the same ordered
//! list:
//!
//! ```text
//! for each file (sorted):  relative_path ‖ 0x00 ‖ len as u64 LE ‖ bytes
//! ```
//!
//! so the same bytes at the same relative paths always give the same digest,
//! regardless of mtimes or enumeration order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::ArchiveError;
use crate::models::{Item, PackagedItem};

/// Patterns never packaged, in addition to configured excludes.
pub fn default_excludes() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.DS_Store".to_string(),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Extra glob patterns (relative to the item directory) to leave out.
    pub exclude_globs: Vec<String>,
    /// When set, archives are also written to `<dir>/<collection>/<name>.zip`.
    pub output_dir: Option<PathBuf>,
}

/// Archive bytes plus digest for one directory.
#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub digest: String,
    pub file_count: usize,
}

/// Package a validated item.
pub fn archive(item: Item, options: &ArchiveOptions) -> Result<PackagedItem, ArchiveError> {
    let excludes = build_excludes(&options.exclude_globs)?;
    let packed = pack_dir(&item.source_path, &excludes)?;

    if let Some(dir) = &options.output_dir {
        write_archive(dir, &item, &packed.bytes)?;
    }

    Ok(PackagedItem {
        item,
        archive_bytes: packed.bytes,
        archive_digest: packed.digest,
        file_count: packed.file_count,
    })
}

/// Build the exclude set: defaults plus `extra`.
pub fn build_excludes(extra: &[String]) -> Result<GlobSet, ArchiveError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in default_excludes().iter().chain(extra) {
        let glob = Glob::new(pattern).map_err(|e| ArchiveError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ArchiveError::Pattern {
        pattern: extra.join(", "),
        message: e.to_string(),
    })
}

/// Zip and digest every non-excluded file under `dir`.
///
/// Nothing is returned unless every file could be read.
pub fn pack_dir(dir: &Path, excludes: &GlobSet) -> Result<Archive, ArchiveError> {
    let files = collect_files(dir, excludes)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let mut hasher = Sha256::new();

    for (relative, path) in &files {
        let data = std::fs::read(path).map_err(|source| ArchiveError::Unreadable {
            path: path.clone(),
            source,
        })?;

        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(&data);

        writer.start_file(relative.as_str(), options)?;
        writer
            .write_all(&data)
            .map_err(zip::result::ZipError::from)?;
    }

    let bytes = writer.finish()?.into_inner();
    Ok(Archive {
        bytes,
        digest: hex::encode(hasher.finalize()),
        file_count: files.len(),
    })
}

/// Regular files under `dir` as `(relative path, absolute path)`, sorted by
/// relative path.
fn collect_files(dir: &Path, excludes: &GlobSet) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::Walk {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = relative_path(dir, path);
        if excludes.is_match(&relative) {
            continue;
        }
        files.push((relative, path.to_path_buf()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn write_archive(dir: &Path, item: &Item, bytes: &[u8]) -> Result<(), ArchiveError> {
    let target_dir = dir.join(item.kind.collection());
    let target = target_dir.join(format!("{}.zip", archive_file_stem(&item.name)));
    std::fs::create_dir_all(&target_dir).map_err(|source| ArchiveError::Write {
        path: target_dir.clone(),
        source,
    })?;
    std::fs::write(&target, bytes).map_err(|source| ArchiveError::Write {
        path: target.clone(),
        source,
    })?;
    tracing::debug!("wrote {}", target.display());
    Ok(())
}

/// File-system safe stem for an item name (`"Download Page"` → `download-page`).
pub fn archive_file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-').to_string();
    if stem.is_empty() {
        "item".to_string()
    } else {
        stem
    }
}
