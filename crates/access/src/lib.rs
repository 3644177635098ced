//! # Homeshare Access Library
//!
//! Path resolution, access control, and directory listing for a single
//! home directory tree.
//!
//! ## Overview
//!
//! Everything a request touches on disk passes through this crate:
//!
//! - **Security Context**: canonical home root and caller group membership
//! - **Path Resolution**: untrusted client paths mapped to authorized locations
//! - **Permissions**: read/write checks and the group-read symlink exception
//! - **Scanning**: lazy, capped directory enumeration with per-entry checks
//! - **View**: visibility filters and a total sort order
//! - **Mutation**: delete and bulk-delete with classified outcomes
//!
//! ## Architecture
//!
//! ```text
//!   raw path ──► PathResolver ──► AuthorizedLocation
//!                    │                   │
//!             PermissionOracle     ┌─────┴──────────┐
//!                    │             ▼                ▼
//!                    ├──► DirectoryScanner    MutationEngine
//!                    │             │                │
//!                    │             ▼                ▼
//!                    │        view::apply     MutationResult
//!                    │             │
//!                    ▼             ▼
//!               access(2)   Vec<DirectoryEntry>
//! ```
//!
//! Path resolution never fails: an unauthorized or missing target resolves
//! to the home root and the location records why. Mutations return
//! [`AccessError`] values that map onto redirect codes via [`ErrorKind`].
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use access::{view, DirectoryScanner, PathResolver, SecurityContext, SystemPermissions};
//!
//! let ctx = SecurityContext::new("/home/alice")?.for_request("projects");
//! let location = PathResolver::new(SystemPermissions::new()).resolve(&ctx);
//!
//! let scanner = DirectoryScanner::new(SystemPermissions::new());
//! let entries = scanner.scan(&ctx, &location, access::DEFAULT_ENTRY_LIMIT)?;
//! for entry in view::apply(entries, &view::ViewPreferences::default()) {
//!     println!("{} {}", entry.name, entry.size_display());
//! }
//! # Ok::<(), access::AccessError>(())
//! ```
//!
//! ## Modules
//!
//! - [`context`]: Security context and caller identity
//! - [`permissions`]: Permission oracle trait and system implementation
//! - [`resolver`]: Path sanitization and resolution
//! - [`scanner`]: Directory enumeration
//! - [`view`]: Filtering, sorting, and size formatting
//! - [`mutation`]: Delete operations
//! - [`error`]: Error types

pub mod context;
pub mod error;
pub mod mutation;
pub mod permissions;
pub mod resolver;
pub mod scanner;
pub mod view;

pub use context::{CallerIdentity, SecurityContext};
pub use error::{AccessError, ErrorKind, Result};
pub use mutation::{Deleted, EntryKind, MutationEngine, MutationResult};
pub use permissions::{mode_string, AccessMode, PermissionOracle, SystemPermissions};
pub use resolver::{entry_name, sanitize, AccessReason, AuthorizedLocation, PathResolver};
pub use scanner::{DirectoryEntry, DirectoryScan, DirectoryScanner, DEFAULT_ENTRY_LIMIT};
pub use view::{SortColumn, SortOrder, ViewPreferences};
