//! Client path resolution with home-root enforcement.
//!
//! A raw client path is sanitized, joined to the home root and, when it
//! names a symbolic link, redirected to the link's literal target. The
//! literal path is kept for navigation so that child paths built as
//! `current_dir/name` stay valid inside a symlinked directory; only the
//! containment decision looks at the canonical form.
//!
//! Bad paths never produce an error. They resolve to the home root and the
//! returned `AccessReason` says why.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::SecurityContext;
use crate::error::{AccessError, Result};
use crate::permissions::{AccessMode, PermissionOracle};

/// Textual traversal sequences removed before any filesystem call.
const TRAVERSAL_SEQUENCES: [&str; 4] = ["../", "..\\", "./", ".\\"];

/// Why a location was (or was not) granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Target lies inside the home root.
    WithinRoot,
    /// Target lies outside the home root and the group exception did not apply.
    SymlinkEscapeDenied,
    /// Target lies outside the home root but is group-readable by the caller.
    GroupPermissionAllowed,
    /// Target is missing, unreadable or not a directory.
    TargetMissing,
}

/// Outcome of resolving a client path.
///
/// When access is not granted, `resolved_path` is the home root and
/// `current_dir` is empty; the remaining fields describe the target that
/// was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedLocation {
    /// Sanitized client path.
    pub raw_path: String,
    /// Relative path shown to the client and used to build child links.
    pub current_dir: String,
    /// Directory that filesystem calls operate on.
    pub resolved_path: PathBuf,
    /// Whether the requested path itself is a symbolic link.
    pub is_symlink: bool,
    /// Literal link target, joined to the link's directory when relative.
    pub symlink_target: Option<PathBuf>,
    /// Whether the evaluated target lies outside the home root.
    pub is_outside_root: bool,
    /// Whether the requested target was granted.
    pub access_granted: bool,
    /// Reason for the decision.
    pub access_reason: AccessReason,
}

impl AuthorizedLocation {
    /// Location for the home root itself.
    pub fn home(ctx: &SecurityContext) -> Self {
        Self {
            raw_path: String::new(),
            current_dir: String::new(),
            resolved_path: ctx.home_root().to_path_buf(),
            is_symlink: false,
            symlink_target: None,
            is_outside_root: false,
            access_granted: true,
            access_reason: AccessReason::WithinRoot,
        }
    }

    /// True when a non-empty request was silently sent back to the home root.
    pub fn redirected_home(&self) -> bool {
        !self.raw_path.is_empty() && !self.access_granted
    }
}

/// Strip traversal sequences and empty, `.` and `..` components.
///
/// The result is always a relative descent such as `a/b/c`.
pub fn sanitize(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    for sequence in TRAVERSAL_SEQUENCES {
        cleaned = cleaned.replace(sequence, "");
    }

    cleaned
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Reduce a client-supplied entry name to its final component.
///
/// Empty names, `.` and `..` are rejected.
pub fn entry_name(name: &str) -> Result<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .ok_or_else(|| AccessError::InvalidName(name.to_string()))
}

/// Resolves client paths to authorized locations.
#[derive(Debug, Clone)]
pub struct PathResolver<P> {
    oracle: P,
}

impl<P: PermissionOracle> PathResolver<P> {
    /// Create a resolver backed by `oracle`.
    pub fn new(oracle: P) -> Self {
        Self { oracle }
    }

    /// The permission oracle in use.
    pub fn oracle(&self) -> &P {
        &self.oracle
    }

    /// Resolve the context's requested path.
    pub fn resolve(&self, ctx: &SecurityContext) -> AuthorizedLocation {
        let raw_path = sanitize(ctx.requested_path());
        if raw_path.is_empty() {
            return AuthorizedLocation::home(ctx);
        }

        let home = ctx.home_root();
        let physical = home.join(&raw_path);
        debug!(path = %physical.display(), "Resolving requested path");

        let is_symlink = fs::symlink_metadata(&physical)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let mut location = AuthorizedLocation {
            raw_path: raw_path.clone(),
            current_dir: String::new(),
            resolved_path: physical.clone(),
            is_symlink,
            symlink_target: None,
            is_outside_root: false,
            access_granted: false,
            access_reason: AccessReason::TargetMissing,
        };

        if is_symlink {
            match fs::read_link(&physical) {
                Ok(target) => {
                    let target = if target.is_relative() {
                        physical.parent().unwrap_or(home).join(target)
                    } else {
                        target
                    };
                    debug!(target = %target.display(), "Requested path is a symlink");
                    location.resolved_path = target.clone();
                    location.symlink_target = Some(target);
                }
                Err(e) => {
                    debug!(error = %e, "Failed to read symlink");
                    return fall_back(ctx, location, AccessReason::TargetMissing);
                }
            }
        }

        let target = location.resolved_path.clone();
        let is_dir = fs::metadata(&target).map(|m| m.is_dir()).unwrap_or(false);
        let canonical = match fs::canonicalize(&target) {
            Ok(canonical) if is_dir => canonical,
            _ => {
                debug!(target = %target.display(), "Target missing or not a directory");
                return fall_back(ctx, location, AccessReason::TargetMissing);
            }
        };

        if ctx.is_within_root(&canonical) {
            if !matches!(self.oracle.can_access(&target, AccessMode::Read), Ok(true)) {
                debug!(target = %target.display(), "Target is not readable");
                return fall_back(ctx, location, AccessReason::TargetMissing);
            }
            location.access_reason = AccessReason::WithinRoot;
        } else {
            location.is_outside_root = true;
            match self.oracle.group_allows_read(&canonical, ctx.caller()) {
                Ok(true) => {
                    debug!(
                        target = %canonical.display(),
                        "Access allowed outside home root via group permissions"
                    );
                    location.access_reason = AccessReason::GroupPermissionAllowed;
                }
                _ => {
                    warn!(target = %canonical.display(), "Access denied to path outside home root");
                    return fall_back(ctx, location, AccessReason::SymlinkEscapeDenied);
                }
            }
        }

        location.access_granted = true;
        location.current_dir = if is_symlink {
            raw_path
        } else {
            relative_display(home, &physical).unwrap_or(raw_path)
        };
        location
    }

    /// Authorize one named entry of an already resolved directory.
    ///
    /// The entry must exist, its canonical path must lie inside the home
    /// root, and it must allow `mode`. Authorization is evaluated afresh on
    /// every call.
    pub fn resolve_child(
        &self,
        ctx: &SecurityContext,
        location: &AuthorizedLocation,
        name: &str,
        mode: AccessMode,
    ) -> Result<PathBuf> {
        let name = entry_name(name)?;
        let path = location.resolved_path.join(&name);

        let canonical = fs::canonicalize(&path).map_err(|e| AccessError::from_io(&path, e))?;
        if !ctx.is_within_root(&canonical) {
            debug!(path = %path.display(), "Entry resolves outside home root");
            return Err(AccessError::PathEscape(path));
        }

        if !self.oracle.can_access(&path, mode)? {
            return Err(match mode {
                AccessMode::Read => AccessError::NotReadable(path),
                AccessMode::Write => AccessError::NotWritable(path),
            });
        }

        Ok(path)
    }
}

fn fall_back(
    ctx: &SecurityContext,
    mut location: AuthorizedLocation,
    reason: AccessReason,
) -> AuthorizedLocation {
    location.resolved_path = ctx.home_root().to_path_buf();
    location.current_dir = String::new();
    location.access_granted = false;
    location.access_reason = reason;
    location
}

fn relative_display(home: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(home).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
