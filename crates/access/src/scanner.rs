//! Directory enumeration with per-entry permission checks.
//!
//! The scan yields the immediate children of an authorized directory as a
//! lazy iterator. A synthetic `..` entry comes first for navigation.
//! Entries the caller cannot read are dropped, except symlinks whose target
//! passes the group-read exception.

use std::fs::{self, Metadata, ReadDir};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::debug;

use crate::context::SecurityContext;
use crate::error::{AccessError, Result};
use crate::permissions::{AccessMode, PermissionOracle};
use crate::resolver::AuthorizedLocation;
use crate::view::format_file_size;

/// Default cap on entries returned by one scan.
pub const DEFAULT_ENTRY_LIMIT: usize = 2000;

/// Name of the synthetic parent navigation entry.
pub const PARENT_ENTRY: &str = "..";

/// Display format for modification timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Path built from the listed directory and the name.
    pub full_path: PathBuf,
    /// Whether the entry (after following symlinks) is a directory.
    pub is_directory: bool,
    /// Whether the entry itself is a symbolic link.
    pub is_symlink: bool,
    /// Readable only through the group-read exception.
    pub symlink_group_access: bool,
    /// Size in bytes; `None` for directories and unreadable sizes.
    pub size_bytes: Option<u64>,
    /// Last modification time.
    pub modified_at: DateTime<Local>,
    /// Whether the caller can read the entry.
    pub readable: bool,
    /// Whether the caller can write the entry.
    pub writable: bool,
    /// Permission bits of the target, when they could be read.
    pub mode: Option<u32>,
}

impl DirectoryEntry {
    /// True for the synthetic `..` entry.
    pub fn is_parent_link(&self) -> bool {
        self.name == PARENT_ENTRY
    }

    /// Human-readable size: empty for directories, `N/A` when unknown.
    pub fn size_display(&self) -> String {
        if self.is_directory {
            return String::new();
        }
        match self.size_bytes {
            Some(bytes) => format_file_size(bytes),
            None => "N/A".to_string(),
        }
    }

    /// Modification time as `YYYY-MM-DD HH:MM:SS`.
    pub fn modified_display(&self) -> String {
        self.modified_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Lists authorized directories.
#[derive(Debug, Clone)]
pub struct DirectoryScanner<P> {
    oracle: P,
}

impl<P: PermissionOracle> DirectoryScanner<P> {
    /// Create a scanner backed by `oracle`.
    pub fn new(oracle: P) -> Self {
        Self { oracle }
    }

    /// Start scanning `location.resolved_path`.
    ///
    /// At most `limit` entries are produced, `..` included. Fails only when
    /// the directory itself cannot be opened.
    pub fn scan<'a>(
        &'a self,
        ctx: &'a SecurityContext,
        location: &AuthorizedLocation,
        limit: usize,
    ) -> Result<DirectoryScan<'a, P>> {
        let dir = location.resolved_path.clone();

        let metadata = fs::metadata(&dir).map_err(|e| AccessError::from_io(&dir, e))?;
        if !metadata.is_dir() {
            return Err(AccessError::NotDirectory(dir));
        }
        let entries = fs::read_dir(&dir).map_err(|e| AccessError::from_io(&dir, e))?;

        debug!(dir = %dir.display(), limit, "Scanning directory");

        Ok(DirectoryScan {
            scanner: self,
            ctx,
            dir,
            entries,
            parent_pending: true,
            limit,
            emitted: 0,
        })
    }

    /// Build the entry for `name` inside `dir`, or `None` if it must be hidden.
    fn inspect(&self, ctx: &SecurityContext, dir: &Path, name: &str) -> Option<DirectoryEntry> {
        let full_path = dir.join(name);

        // Entry vanished between readdir and stat.
        let link_metadata = fs::symlink_metadata(&full_path).ok()?;
        let is_symlink = link_metadata.file_type().is_symlink();

        let readable = matches!(
            self.oracle.can_access(&full_path, AccessMode::Read),
            Ok(true)
        );

        let mut symlink_group_access = false;
        if !readable {
            if !is_symlink {
                debug!(path = %full_path.display(), "Skipping unreadable entry");
                return None;
            }
            match self.oracle.group_allows_read(&full_path, ctx.caller()) {
                Ok(true) => symlink_group_access = true,
                _ => {
                    debug!(path = %full_path.display(), "Skipping symlink without group read access");
                    return None;
                }
            }
        }

        let metadata = fs::metadata(&full_path).ok();
        let is_directory = metadata.as_ref().is_some_and(Metadata::is_dir);
        let size_bytes = if is_directory {
            None
        } else {
            metadata.as_ref().map(Metadata::len)
        };
        let modified = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .or_else(|| link_metadata.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        // Targets outside the root are never writable, whatever the mode bits say.
        let writable = fs::canonicalize(&full_path)
            .is_ok_and(|canonical| ctx.is_within_root(&canonical))
            && matches!(
                self.oracle.can_access(&full_path, AccessMode::Write),
                Ok(true)
            );

        Some(DirectoryEntry {
            name: name.to_string(),
            full_path,
            is_directory,
            is_symlink,
            symlink_group_access,
            size_bytes,
            modified_at: DateTime::<Local>::from(modified),
            readable: true,
            writable,
            mode: metadata.as_ref().map(MetadataExt::mode),
        })
    }
}

/// Lazy, single-pass listing of one directory.
pub struct DirectoryScan<'a, P> {
    scanner: &'a DirectoryScanner<P>,
    ctx: &'a SecurityContext,
    dir: PathBuf,
    entries: ReadDir,
    parent_pending: bool,
    limit: usize,
    emitted: usize,
}

impl<P: PermissionOracle> Iterator for DirectoryScan<'_, P> {
    type Item = DirectoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.limit {
            return None;
        }

        if self.parent_pending {
            self.parent_pending = false;
            if let Some(entry) = self.scanner.inspect(self.ctx, &self.dir, PARENT_ENTRY) {
                self.emitted += 1;
                return Some(entry);
            }
        }

        loop {
            let dir_entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if let Some(entry) = self.scanner.inspect(self.ctx, &self.dir, &name) {
                self.emitted += 1;
                return Some(entry);
            }
        }
    }
}
