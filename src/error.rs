//! Error kinds raised by the pipeline stages.
//!
//! Only [`ScanError`] aborts a run. Every other kind is attached to the item
//! that produced it and the batch carries on without that item.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::ItemKind;

/// The collection root could not be listed.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("scan root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to list {}: {source}", .path.display())]
    Unlistable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A metadata descriptor or entry file was rejected.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{}: failed to read {file}: {message}", .path.display())]
    Unreadable {
        path: PathBuf,
        file: String,
        message: String,
    },

    #[error("{}: metadata is not valid JSON: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("{}: missing required field `{field}`", .path.display())]
    MissingField { path: PathBuf, field: String },

    #[error("{}: field `{field}` must be {expected}", .path.display())]
    WrongShape {
        path: PathBuf,
        field: String,
        expected: &'static str,
    },

    #[error("{}: duplicate {kind} name `{name}`", .path.display())]
    NameCollision {
        path: PathBuf,
        kind: ItemKind,
        name: String,
    },

    #[error("{}: {kind} name `{name}` maps to archive file `{stem}.zip`, shared with another {kind}", .path.display())]
    FileNameCollision {
        path: PathBuf,
        kind: ItemKind,
        name: String,
        stem: String,
    },
}

impl ValidationError {
    /// The item directory the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ValidationError::Unreadable { path, .. }
            | ValidationError::Malformed { path, .. }
            | ValidationError::MissingField { path, .. }
            | ValidationError::WrongShape { path, .. }
            | ValidationError::NameCollision { path, .. }
            | ValidationError::FileNameCollision { path, .. } => path,
        }
    }

    /// The offending field, when the error is about one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField { field, .. }
            | ValidationError::WrongShape { field, .. } => Some(field),
            ValidationError::NameCollision { .. }
            | ValidationError::FileNameCollision { .. } => Some("name"),
            _ => None,
        }
    }
}

/// Building an item's archive failed. No partial archive is ever returned.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {message}", .path.display())]
    Walk { path: PathBuf, message: String },

    #[error("invalid exclude pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write archive to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The node refused or could not be reached.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("node returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("node response carried no identifier: {body}")]
    MissingId { body: String },

    #[error("node request failed: {0}")]
    Transport(String),
}

impl RegistrationError {
    /// Transport failures, HTTP 429 and 5xx may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistrationError::Transport(_) => true,
            RegistrationError::Rejected { status, .. } => is_transient_status(*status),
            RegistrationError::MissingId { .. } => false,
        }
    }
}

/// The store refused the artifact or could not be reached.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("artifact already exists in store")]
    AlreadyExists,

    #[error("store returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("store request failed: {0}")]
    Transport(String),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Transport(_) => true,
            UploadError::Rejected { status, .. } => is_transient_status(*status),
            UploadError::AlreadyExists => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
