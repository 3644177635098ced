//! Per-request security context.
//!
//! The home root is canonicalized once when the context is built. Every
//! other component receives the context explicitly instead of reading the
//! process environment.

use std::fs;
use std::path::{Component, Path, PathBuf};

use nix::unistd::{getegid, getgroups, Gid};

use crate::error::{AccessError, Result};

/// Group membership of the process serving requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    groups: Vec<Gid>,
}

impl CallerIdentity {
    /// Capture the effective and supplementary groups of this process.
    pub fn current() -> Self {
        let mut groups = getgroups().unwrap_or_default();
        let egid = getegid();
        if !groups.contains(&egid) {
            groups.push(egid);
        }
        Self { groups }
    }

    /// Build an identity from an explicit group list.
    pub fn with_groups(groups: Vec<Gid>) -> Self {
        Self { groups }
    }

    /// Groups the caller belongs to.
    pub fn groups(&self) -> &[Gid] {
        &self.groups
    }

    /// Check membership of a raw gid.
    pub fn in_group(&self, gid: u32) -> bool {
        self.groups.iter().any(|g| g.as_raw() == gid)
    }
}

/// Immutable security context for one request.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    home_root: PathBuf,
    caller: CallerIdentity,
    requested_path: String,
}

impl SecurityContext {
    /// Create a context rooted at `home_root` for the current process.
    ///
    /// The root is canonicalized and must be a directory.
    pub fn new(home_root: impl AsRef<Path>) -> Result<Self> {
        Self::with_caller(home_root, CallerIdentity::current())
    }

    /// Create a context with an explicit caller identity.
    pub fn with_caller(home_root: impl AsRef<Path>, caller: CallerIdentity) -> Result<Self> {
        let home_root = home_root.as_ref();
        let canonical =
            fs::canonicalize(home_root).map_err(|e| AccessError::from_io(home_root, e))?;
        let metadata = fs::metadata(&canonical).map_err(|e| AccessError::from_io(&canonical, e))?;
        if !metadata.is_dir() {
            return Err(AccessError::NotDirectory(canonical));
        }
        fs::read_dir(&canonical).map_err(|_| AccessError::NotReadable(canonical.clone()))?;

        Ok(Self {
            home_root: canonical,
            caller,
            requested_path: String::new(),
        })
    }

    /// Copy of this context carrying the raw path a client asked for.
    pub fn for_request(&self, requested_path: impl Into<String>) -> Self {
        Self {
            home_root: self.home_root.clone(),
            caller: self.caller.clone(),
            requested_path: requested_path.into(),
        }
    }

    /// Canonical home root.
    pub fn home_root(&self) -> &Path {
        &self.home_root
    }

    /// Caller group membership.
    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Raw, untrusted path supplied by the client.
    pub fn requested_path(&self) -> &str {
        &self.requested_path
    }

    /// Component-wise containment test against the home root.
    ///
    /// `path` is normalized lexically first, so `root/a/../..` is outside.
    pub fn is_within_root(&self, path: &Path) -> bool {
        normalize_lexically(path).starts_with(&self.home_root)
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_canonicalizes_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("home")).unwrap();
        let dotted = temp_dir.path().join("home/./../home");

        let ctx = SecurityContext::new(&dotted).unwrap();
        assert_eq!(
            ctx.home_root(),
            fs::canonicalize(temp_dir.path().join("home")).unwrap()
        );
    }

    #[test]
    fn test_context_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = SecurityContext::new(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(AccessError::NotFound(_))));
    }

    #[test]
    fn test_context_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let result = SecurityContext::new(&file);
        assert!(matches!(result, Err(AccessError::NotDirectory(_))));
    }

    #[test]
    fn test_for_request_keeps_root() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = SecurityContext::new(temp_dir.path()).unwrap();
        let request = ctx.for_request("docs/notes");

        assert_eq!(request.home_root(), ctx.home_root());
        assert_eq!(request.requested_path(), "docs/notes");
        assert_eq!(ctx.requested_path(), "");
    }

    #[test]
    fn test_is_within_root_is_component_wise() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("al")).unwrap();
        let ctx = SecurityContext::new(temp_dir.path().join("al")).unwrap();
        let root = ctx.home_root().to_path_buf();

        assert!(ctx.is_within_root(&root));
        assert!(ctx.is_within_root(&root.join("docs")));
        assert!(!ctx.is_within_root(&root.with_file_name("alice")));
        assert!(!ctx.is_within_root(&root.join("docs/../..")));
    }

    #[test]
    fn test_caller_identity_membership() {
        let caller = CallerIdentity::with_groups(vec![Gid::from_raw(10), Gid::from_raw(20)]);
        assert!(caller.in_group(20));
        assert!(!caller.in_group(30));

        let current = CallerIdentity::current();
        assert!(current.in_group(getegid().as_raw()));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/a/../..")), PathBuf::from("/"));
    }
}
