//! Request router for dispatching browse requests to the access core.
//!
//! A request carries a directory, optional view preferences and at most one
//! effective action. Actions are tried in a fixed order (view, download,
//! delete, bulk download, bulk delete); an action whose target is not
//! authorized falls through to the next one and finally to the listing.
//! Mutations always answer with a redirect back to the directory.

use std::path::PathBuf;

use access::view::{self, SortColumn, SortOrder, ViewPreferences};
use access::{
    mode_string, AccessError, AccessReason, AccessMode, AuthorizedLocation, DirectoryEntry,
    DirectoryScanner, MutationEngine, PathResolver, PermissionOracle, SecurityContext,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::transfer::{Disposition, FileResponse, FileTransfer, TransferError};

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors that can occur while serving a routed request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Access core error.
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    /// File streaming error.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Notice parameters carried back on the redirect after a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeParams {
    /// Name of a deleted entry.
    pub deleted: Option<String>,
    /// `file` or `directory` for `deleted`.
    pub kind: Option<String>,
    /// Count of entries removed by a bulk delete.
    pub bulk_deleted: Option<String>,
    /// Count of entries a bulk delete could not remove.
    pub bulk_errors: Option<String>,
    /// Error code of a failed action.
    pub error: Option<String>,
}

/// A parsed browse request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseRequest {
    /// Raw requested directory.
    pub dir: String,
    /// Entry to show inline.
    pub view: Option<String>,
    /// Entry to send as an attachment.
    pub download: Option<String>,
    /// Entry to delete.
    pub delete: Option<String>,
    /// Entries selected for a combined download.
    pub bulk_download: Option<Vec<String>>,
    /// Entries selected for deletion.
    pub bulk_delete: Option<Vec<String>>,
    /// Notice parameters for the listing.
    pub notice: NoticeParams,
}

impl BrowseRequest {
    /// Request for a plain listing of `dir`.
    pub fn listing(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// A file the client asked to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    /// Authorized path.
    pub path: PathBuf,
    /// Inline or attachment.
    pub disposition: Disposition,
}

/// Outcome of routing a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterResponse {
    /// Redirect to this relative location (`?dir=...`).
    Redirect(String),
    /// Directory listing.
    Listing(ListingResponse),
    /// Stream a file.
    File(FileTarget),
}

/// One breadcrumb segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Label.
    pub name: String,
    /// Relative directory it links to.
    pub path: String,
}

/// Visual weight of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Danger,
}

/// Message shown above a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Plain-text message.
    pub message: String,
}

/// Column header link: the order a click on `column` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortLink {
    /// Column the header sorts by.
    pub column: SortColumn,
    /// Order the link requests.
    pub order: SortOrder,
}

/// A listing row with display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Entry name.
    pub name: String,
    /// Relative path for navigation.
    pub path: String,
    /// Whether the entry is (or links to) a directory.
    pub is_directory: bool,
    /// Whether the entry is a symbolic link.
    pub is_symlink: bool,
    /// Visible only through the group-read exception.
    pub symlink_group_access: bool,
    /// Size in bytes, when known.
    pub size_bytes: Option<u64>,
    /// Formatted size.
    pub size: String,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub modified: String,
    /// `rwxr-xr-x` style permissions.
    pub permissions: String,
    /// Whether the entry can be deleted.
    pub writable: bool,
}

/// JSON body of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingResponse {
    /// Directory shown, relative to the home root.
    pub current_dir: String,
    /// A non-empty request was sent back to the home root.
    pub redirected_home: bool,
    /// Why the requested directory was or was not granted.
    pub access_reason: AccessReason,
    /// Effective view preferences.
    pub preferences: ViewPreferences,
    /// Header links for name, size and modified, in that order.
    pub sort_links: Vec<SortLink>,
    /// Home plus one crumb per path segment.
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Message derived from notice parameters.
    pub notice: Option<Notice>,
    /// Whether listing is enabled at all.
    pub listing_enabled: bool,
    /// The directory had more entries than the listing cap.
    pub truncated: bool,
    /// Ordered, filtered entries.
    pub entries: Vec<ListingEntry>,
}

/// Listing behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterSettings {
    /// Cap on scanned entries, `..` included.
    pub max_entries: usize,
    /// Whether directory contents are listed.
    pub allow_listing: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_entries: access::DEFAULT_ENTRY_LIMIT,
            allow_listing: true,
        }
    }
}

/// Dispatches browse requests against one home root.
pub struct RequestRouter<P> {
    ctx: SecurityContext,
    resolver: PathResolver<P>,
    scanner: DirectoryScanner<P>,
    mutations: MutationEngine<P>,
    settings: RouterSettings,
}

impl<P: PermissionOracle + Clone> RequestRouter<P> {
    /// Create a router for `ctx` backed by `oracle`.
    pub fn new(ctx: SecurityContext, oracle: P, settings: RouterSettings) -> Self {
        Self {
            ctx,
            resolver: PathResolver::new(oracle.clone()),
            scanner: DirectoryScanner::new(oracle.clone()),
            mutations: MutationEngine::new(oracle),
            settings,
        }
    }

    /// The base security context.
    pub fn context(&self) -> &SecurityContext {
        &self.ctx
    }

    /// Resolve a raw directory the way a request would.
    pub fn resolve(&self, dir: &str) -> AuthorizedLocation {
        self.resolver.resolve(&self.ctx.for_request(dir))
    }

    /// Route one request using the caller's effective preferences.
    pub fn handle(&self, request: &BrowseRequest, prefs: &ViewPreferences) -> RouterResponse {
        let ctx = self.ctx.for_request(request.dir.as_str());
        let location = self.resolver.resolve(&ctx);
        if location.redirected_home() {
            debug!(
                dir = %request.dir,
                reason = ?location.access_reason,
                "Requested directory fell back to home"
            );
        }

        if let Some(name) = non_empty(&request.view) {
            if let Some(path) = self.readable_file(&ctx, &location, name) {
                return RouterResponse::File(FileTarget {
                    path,
                    disposition: Disposition::Inline,
                });
            }
        }

        if let Some(name) = non_empty(&request.download) {
            if let Some(path) = self.readable_file(&ctx, &location, name) {
                return RouterResponse::File(FileTarget {
                    path,
                    disposition: Disposition::Attachment,
                });
            }
        }

        if let Some(name) = non_empty(&request.delete) {
            let query = match self.mutations.delete(&ctx, &location, name) {
                Ok(deleted) => redirect_to(
                    &location.current_dir,
                    &[("deleted", deleted.name.as_str()), ("type", deleted.kind.as_str())],
                ),
                Err(e) => {
                    warn!(name, error = %e, "Delete refused");
                    redirect_to(&location.current_dir, &[("error", e.kind().redirect_code())])
                }
            };
            return RouterResponse::Redirect(query);
        }

        if let Some(files) = &request.bulk_download {
            match files.as_slice() {
                [name] => {
                    if let Some(path) = self.readable_file(&ctx, &location, name) {
                        return RouterResponse::File(FileTarget {
                            path,
                            disposition: Disposition::Attachment,
                        });
                    }
                }
                _ => {
                    let code = AccessError::BulkUnsupported(files.len()).kind().redirect_code();
                    return RouterResponse::Redirect(redirect_to(
                        &location.current_dir,
                        &[("error", code)],
                    ));
                }
            }
        }

        if let Some(items) = &request.bulk_delete {
            let result = self.mutations.bulk_delete(&ctx, &location, items);
            let params = result.redirect_params();
            let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            return RouterResponse::Redirect(redirect_to(&location.current_dir, &params));
        }

        RouterResponse::Listing(self.listing(&ctx, &location, request, prefs))
    }

    /// Open a routed file for streaming.
    pub async fn open_file(target: &FileTarget) -> RouterResult<FileResponse> {
        Ok(FileTransfer::open(&target.path, target.disposition).await?)
    }

    fn readable_file(
        &self,
        ctx: &SecurityContext,
        location: &AuthorizedLocation,
        name: &str,
    ) -> Option<PathBuf> {
        match self
            .resolver
            .resolve_child(ctx, location, name, AccessMode::Read)
        {
            Ok(path) if path.is_file() => Some(path),
            Ok(path) => {
                debug!(path = %path.display(), "Requested entry is not a regular file");
                None
            }
            Err(e) => {
                debug!(name, error = %e, "Requested file not authorized");
                None
            }
        }
    }

    fn listing(
        &self,
        ctx: &SecurityContext,
        location: &AuthorizedLocation,
        request: &BrowseRequest,
        prefs: &ViewPreferences,
    ) -> ListingResponse {
        let mut truncated = false;
        let mut entries = Vec::new();

        if self.settings.allow_listing {
            let limit = self.settings.max_entries;
            match self.scanner.scan(ctx, location, limit.saturating_add(1)) {
                Ok(scan) => {
                    let mut raw: Vec<DirectoryEntry> = scan.collect();
                    if raw.len() > limit {
                        raw.truncate(limit);
                        truncated = true;
                    }
                    entries = view::apply(raw, prefs)
                        .iter()
                        .map(|entry| listing_entry(&location.current_dir, entry))
                        .collect();
                }
                Err(e) => {
                    warn!(dir = %location.resolved_path.display(), error = %e, "Failed to list directory");
                }
            }
        }

        info!(
            dir = %location.current_dir,
            entries = entries.len(),
            truncated,
            "Listed directory"
        );

        ListingResponse {
            current_dir: location.current_dir.clone(),
            redirected_home: location.redirected_home(),
            access_reason: location.access_reason,
            preferences: *prefs,
            sort_links: sort_links(prefs),
            breadcrumbs: breadcrumbs(&location.current_dir),
            notice: notice(&request.notice),
            listing_enabled: self.settings.allow_listing,
            truncated,
            entries,
        }
    }
}

/// Build `?dir=<current>&k=v...` with form encoding.
pub fn redirect_to(current_dir: &str, params: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::from("?"));
    serializer.append_pair("dir", current_dir);
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Sort links for every column under `prefs`.
pub fn sort_links(prefs: &ViewPreferences) -> Vec<SortLink> {
    [SortColumn::Name, SortColumn::Size, SortColumn::Modified]
        .into_iter()
        .map(|column| SortLink {
            column,
            order: view::toggle_order(column, prefs),
        })
        .collect()
}

/// Home plus one crumb per segment of `current_dir`.
pub fn breadcrumbs(current_dir: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        name: "Home".to_string(),
        path: String::new(),
    }];

    let mut path = String::new();
    for part in current_dir.split('/').filter(|p| !p.is_empty()) {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(part);
        crumbs.push(Breadcrumb {
            name: part.to_string(),
            path: path.clone(),
        });
    }

    crumbs
}

/// Message for the notice parameters, if any apply.
///
/// Precedence: single delete, then bulk delete, then error.
pub fn notice(params: &NoticeParams) -> Option<Notice> {
    if let Some(name) = &params.deleted {
        let kind = if params.kind.as_deref() == Some("directory") {
            "Directory"
        } else {
            "File"
        };
        return Some(Notice {
            level: NoticeLevel::Success,
            message: format!("{kind} {name} was successfully deleted."),
        });
    }

    if let Some(count) = &params.bulk_deleted {
        let mut message = format!("{} item(s) were successfully deleted.", leading_int(count));
        let errors = params.bulk_errors.as_deref().map(leading_int).unwrap_or(0);
        if errors > 0 {
            message.push_str(&format!(" However, {errors} item(s) could not be deleted."));
        }
        return Some(Notice {
            level: NoticeLevel::Success,
            message,
        });
    }

    params.error.as_deref().map(|code| Notice {
        level: NoticeLevel::Danger,
        message: match code {
            "delete" => "Error deleting item. Check permissions.",
            "invalid" => "Cannot delete item. It may not exist or not be writable.",
            "notempty" => "Cannot delete directory because it is not empty.",
            "bulkdownload" => "Bulk download of multiple files is not supported yet.",
            _ => "An error occurred.",
        }
        .to_string(),
    })
}

fn listing_entry(current_dir: &str, entry: &DirectoryEntry) -> ListingEntry {
    let path = if entry.is_parent_link() {
        current_dir
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default()
    } else if current_dir.is_empty() {
        entry.name.clone()
    } else {
        format!("{current_dir}/{}", entry.name)
    };

    ListingEntry {
        name: entry.name.clone(),
        path,
        is_directory: entry.is_directory,
        is_symlink: entry.is_symlink,
        symlink_group_access: entry.symlink_group_access,
        size_bytes: entry.size_bytes,
        size: entry.size_display(),
        modified: entry.modified_display(),
        permissions: mode_string(entry.mode),
        writable: entry.writable,
    }
}

/// Integer prefix of `s`, 0 when there is none.
fn leading_int(s: &str) -> u64 {
    let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
