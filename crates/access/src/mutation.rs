//! Delete and bulk-delete of directory entries.
//!
//! Every target is authorized through [`PathResolver::resolve_child`] with
//! write access before anything is removed. Bulk deletes process each name
//! independently and aggregate the outcomes; one failure never stops the
//! rest.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::SecurityContext;
use crate::error::{AccessError, ErrorKind, Result};
use crate::permissions::{AccessMode, PermissionOracle};
use crate::resolver::{entry_name, AuthorizedLocation, PathResolver};

/// What kind of entry a delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file or symbolic link.
    File,
    /// Empty directory.
    Directory,
}

impl EntryKind {
    /// Value of the `type=` redirect parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

/// A successful single delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    /// Entry name as removed.
    pub name: String,
    /// Kind of the removed entry.
    pub kind: EntryKind,
}

/// Aggregate outcome of a bulk delete.
///
/// Both lists hold the names as requested, one item per attempt, so a name
/// submitted twice is counted twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Requested names that were removed.
    pub succeeded: Vec<String>,
    /// Requested names that were not removed, with the reason.
    pub failed: Vec<(String, ErrorKind)>,
}

impl MutationResult {
    /// Number of removed entries.
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of entries that could not be removed.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Redirect parameters: `bulk_deleted`, plus `bulk_errors` when anything failed.
    pub fn redirect_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("bulk_deleted", self.succeeded_count().to_string())];
        if self.failed_count() > 0 {
            params.push(("bulk_errors", self.failed_count().to_string()));
        }
        params
    }
}

/// Executes deletes against authorized targets.
#[derive(Debug, Clone)]
pub struct MutationEngine<P> {
    resolver: PathResolver<P>,
}

impl<P: PermissionOracle> MutationEngine<P> {
    /// Create an engine backed by `oracle`.
    pub fn new(oracle: P) -> Self {
        Self {
            resolver: PathResolver::new(oracle),
        }
    }

    /// Delete one entry of `location`.
    ///
    /// Files and symbolic links are unlinked; directories are removed only
    /// when empty.
    pub fn delete(
        &self,
        ctx: &SecurityContext,
        location: &AuthorizedLocation,
        name: &str,
    ) -> Result<Deleted> {
        if !location.access_granted && !location.raw_path.is_empty() {
            return Err(AccessError::PathEscape(location.resolved_path.join(name)));
        }

        let path = self
            .resolver
            .resolve_child(ctx, location, name, AccessMode::Write)?;
        let name = entry_name(name)?;

        let metadata = fs::symlink_metadata(&path).map_err(|e| AccessError::from_io(&path, e))?;
        let kind = if metadata.is_dir() {
            let mut children = fs::read_dir(&path).map_err(|e| AccessError::from_io(&path, e))?;
            if children.next().is_some() {
                debug!(path = %path.display(), "Refusing to delete non-empty directory");
                return Err(AccessError::NotEmpty(path));
            }
            fs::remove_dir(&path).map_err(|source| {
                warn!(path = %path.display(), error = %source, "Failed to remove directory");
                AccessError::DeleteFailed {
                    path: path.clone(),
                    source,
                }
            })?;
            EntryKind::Directory
        } else {
            fs::remove_file(&path).map_err(|source| {
                warn!(path = %path.display(), error = %source, "Failed to remove file");
                AccessError::DeleteFailed {
                    path: path.clone(),
                    source,
                }
            })?;
            EntryKind::File
        };

        info!(path = %path.display(), kind = kind.as_str(), "Deleted entry");
        Ok(Deleted { name, kind })
    }

    /// Delete every named entry, collecting per-name outcomes.
    pub fn bulk_delete<S: AsRef<str>>(
        &self,
        ctx: &SecurityContext,
        location: &AuthorizedLocation,
        names: &[S],
    ) -> MutationResult {
        let mut result = MutationResult::default();

        for name in names {
            let name = name.as_ref();
            match self.delete(ctx, location, name) {
                Ok(_) => result.succeeded.push(name.to_string()),
                Err(e) => {
                    debug!(name, error = %e, "Bulk delete item failed");
                    result.failed.push((name.to_string(), e.kind()));
                }
            }
        }

        info!(
            succeeded = result.succeeded_count(),
            failed = result.failed_count(),
            "Bulk delete finished"
        );
        result
    }
}
