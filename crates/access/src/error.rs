//! Error types for the access crate.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of an access failure.
///
/// `AccessError` carries the offending path; `ErrorKind` is the
/// payload-free tag used in aggregated results and redirect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resolved outside the home root with no group exception.
    PathEscape,
    /// Target does not exist.
    NotFound,
    /// Target exists but cannot be read.
    NotReadable,
    /// Target exists but cannot be written.
    NotWritable,
    /// A directory was required.
    NotDirectory,
    /// Directory delete refused because it still has entries.
    NotEmpty,
    /// The removal call itself failed after all checks passed.
    DeleteFailed,
    /// More than one file requested for a combined download.
    BulkUnsupported,
    /// Entry name is empty, `.` or `..`.
    InvalidName,
}

impl ErrorKind {
    /// The `error=` value the listing redirect carries for this kind.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            ErrorKind::NotEmpty => "notempty",
            ErrorKind::DeleteFailed => "delete",
            ErrorKind::BulkUnsupported => "bulkdownload",
            ErrorKind::PathEscape
            | ErrorKind::NotFound
            | ErrorKind::NotReadable
            | ErrorKind::NotWritable
            | ErrorKind::NotDirectory
            | ErrorKind::InvalidName => "invalid",
        }
    }
}

/// Access error type covering resolution, permission and mutation failures.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Path resolves outside the home root.
    #[error("path escapes home root: {0}")]
    PathEscape(PathBuf),

    /// Path does not exist.
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// Path is not readable by the caller.
    #[error("path is not readable: {0}")]
    NotReadable(PathBuf),

    /// Path is not writable by the caller.
    #[error("path is not writable: {0}")]
    NotWritable(PathBuf),

    /// Path is not a directory.
    #[error("path is not a directory: {0}")]
    NotDirectory(PathBuf),

    /// Directory still has entries.
    #[error("directory is not empty: {0}")]
    NotEmpty(PathBuf),

    /// The removal syscall failed.
    #[error("failed to delete {path}: {source}")]
    DeleteFailed {
        /// Path that could not be removed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Combined download of several files requested.
    #[error("bulk download of {0} files is not supported")]
    BulkUnsupported(usize),

    /// Entry name cannot address a child entry.
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AccessError {
    /// Payload-free classification of this error.
    ///
    /// Raw IO errors surface as `NotFound` or `NotReadable` depending on
    /// the OS error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::PathEscape(_) => ErrorKind::PathEscape,
            AccessError::NotFound(_) => ErrorKind::NotFound,
            AccessError::NotReadable(_) => ErrorKind::NotReadable,
            AccessError::NotWritable(_) => ErrorKind::NotWritable,
            AccessError::NotDirectory(_) => ErrorKind::NotDirectory,
            AccessError::NotEmpty(_) => ErrorKind::NotEmpty,
            AccessError::DeleteFailed { .. } => ErrorKind::DeleteFailed,
            AccessError::BulkUnsupported(_) => ErrorKind::BulkUnsupported,
            AccessError::InvalidName(_) => ErrorKind::InvalidName,
            AccessError::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            AccessError::Io(_) => ErrorKind::NotReadable,
        }
    }

    /// Map an IO error on `path` to the matching variant.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AccessError::NotFound(path.into()),
            io::ErrorKind::PermissionDenied => AccessError::NotReadable(path.into()),
            _ => AccessError::Io(err),
        }
    }
}

/// Result type alias for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
