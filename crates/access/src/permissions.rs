//! Filesystem permission checks.
//!
//! `PermissionOracle` answers whether the serving process may read or write
//! a path, plus the group-read exception used for symlink targets outside
//! the home root. Components take the oracle as a generic parameter so
//! tests can substitute their own answers.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};

use crate::context::CallerIdentity;
use crate::error::{AccessError, Result};

/// Group read permission bit.
const GROUP_READ: u32 = 0o040;

/// Kind of access being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read a file or list a directory.
    Read,
    /// Modify or delete.
    Write,
}

/// Answers access questions about filesystem objects.
pub trait PermissionOracle: Send + Sync {
    /// Whether the caller may access `path` in `mode`.
    ///
    /// Returns `Err(NotFound)` when the path (or a symlink's target) does
    /// not exist; a plain denial is `Ok(false)`.
    fn can_access(&self, path: &Path, mode: AccessMode) -> Result<bool>;

    /// Whether `path` is group-readable by a group the caller belongs to.
    ///
    /// Symlinks are followed.
    fn group_allows_read(&self, path: &Path, caller: &CallerIdentity) -> Result<bool>;
}

/// Oracle backed by `access(2)` and `stat(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPermissions;

impl SystemPermissions {
    /// Create a new system oracle.
    pub fn new() -> Self {
        Self
    }
}

impl PermissionOracle for SystemPermissions {
    fn can_access(&self, path: &Path, mode: AccessMode) -> Result<bool> {
        let flags = match mode {
            AccessMode::Read => AccessFlags::R_OK,
            AccessMode::Write => AccessFlags::W_OK,
        };

        match access(path, flags) {
            Ok(()) => Ok(true),
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => Err(AccessError::NotFound(path.to_path_buf())),
            Err(Errno::EACCES) | Err(Errno::EPERM) | Err(Errno::EROFS) => Ok(false),
            Err(errno) => Err(AccessError::Io(errno.into())),
        }
    }

    fn group_allows_read(&self, path: &Path, caller: &CallerIdentity) -> Result<bool> {
        let metadata = fs::metadata(path).map_err(|e| AccessError::from_io(path, e))?;
        Ok(metadata.mode() & GROUP_READ != 0 && caller.in_group(metadata.gid()))
    }
}

/// Render the nine permission bits as `rwxr-x---`.
pub fn mode_string(mode: Option<u32>) -> String {
    let Some(mode) = mode else {
        return "?????????".to_string();
    };

    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];

    BITS.iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}
