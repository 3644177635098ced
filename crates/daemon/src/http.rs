//! HTTP surface.
//!
//! `GET /` and `POST /` browse the home tree, `GET /healthz` answers
//! liveness probes. Listings are JSON, mutations answer `303 See Other`,
//! files are streamed.

use std::future::Future;
use std::sync::Arc;

use access::view::PreferenceOverrides;
use access::{AuthorizedLocation, SecurityContext, SystemPermissions};
use anyhow::Context;
use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::config::Config;
use crate::router::{
    BrowseRequest, NoticeParams, RequestRouter, RouterError, RouterResponse, RouterSettings,
};
use crate::session::{session_cookie, session_id_from_headers, PreferenceStore};
use crate::transfer::{FileResponse, TransferError};

/// Shared state of the HTTP service.
#[derive(Clone)]
pub struct AppState {
    router: Arc<RequestRouter<SystemPermissions>>,
    preferences: Arc<PreferenceStore>,
    cookie_name: Arc<str>,
}

impl AppState {
    /// Assemble state from its parts.
    pub fn new(
        router: RequestRouter<SystemPermissions>,
        preferences: Arc<PreferenceStore>,
        cookie_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            router: Arc::new(router),
            preferences,
            cookie_name: cookie_name.into(),
        }
    }

    /// Build state for a validated configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let home = config.resolve_home_root()?;
        let ctx = SecurityContext::new(&home)
            .with_context(|| format!("Cannot serve home root {}", home.display()))?;
        tracing::info!(home = %ctx.home_root().display(), "Serving home root");

        let router = RequestRouter::new(
            ctx,
            SystemPermissions::new(),
            RouterSettings {
                max_entries: config.browse.max_entries,
                allow_listing: config.browse.allow_listing,
            },
        );
        Ok(Self::new(
            router,
            Arc::new(PreferenceStore::new()),
            config.session.cookie_name.as_str(),
        ))
    }

    /// The preference store.
    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    /// Resolve a client path against the served root.
    pub fn resolve(&self, dir: &str) -> AuthorizedLocation {
        self.router.resolve(dir)
    }
}

/// Query parameters accepted on `/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Directory relative to the home root.
    pub dir: Option<String>,
    /// Sort column: `name`, `size` or `modified`.
    pub sort: Option<String>,
    /// Sort order: `asc` or `desc`.
    pub order: Option<String>,
    /// Hide entries starting with a dot.
    pub hide_dotfiles: Option<String>,
    /// Hide directories.
    pub hide_dirs: Option<String>,
    /// Hide files.
    pub hide_files: Option<String>,
    /// Entry to show inline.
    pub view: Option<String>,
    /// Entry to send as an attachment.
    pub download: Option<String>,
    /// Entry to delete.
    pub delete: Option<String>,
    /// Marks a POST as a bulk download of the `files` field.
    pub bulk_download: Option<String>,
    /// Marks a POST as a bulk delete of the `items` field.
    pub bulk_delete: Option<String>,
    /// Name reported by a delete redirect.
    pub deleted: Option<String>,
    /// `file` or `directory` for `deleted`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Count reported by a bulk delete redirect.
    pub bulk_deleted: Option<String>,
    /// Failure count reported by a bulk delete redirect.
    pub bulk_errors: Option<String>,
    /// Error code reported by a redirect.
    pub error: Option<String>,
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(browse).post(browse_form))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn browse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (request, overrides) = browse_request(query, None);
    dispatch(state, Method::GET, headers, request, overrides).await
}

async fn browse_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    let (request, overrides) = browse_request(query, Some(form));
    dispatch(state, Method::POST, headers, request, overrides).await
}

/// Split query and form parameters into a request and preference overrides.
///
/// Bulk actions need the `bulk_download` / `bulk_delete` query flag and at
/// least one `files` / `items` form field.
pub fn browse_request(
    query: ListQuery,
    form: Option<Vec<(String, String)>>,
) -> (BrowseRequest, PreferenceOverrides) {
    let overrides = PreferenceOverrides::from_params(
        query.sort.as_deref(),
        query.order.as_deref(),
        query.hide_dotfiles.as_deref(),
        query.hide_dirs.as_deref(),
        query.hide_files.as_deref(),
    );

    let form = form.unwrap_or_default();
    let bulk_download = query
        .bulk_download
        .as_ref()
        .and_then(|_| form_values(&form, "files"));
    let bulk_delete = query
        .bulk_delete
        .as_ref()
        .and_then(|_| form_values(&form, "items"));

    let request = BrowseRequest {
        dir: query.dir.unwrap_or_default(),
        view: query.view,
        download: query.download,
        delete: query.delete,
        bulk_download,
        bulk_delete,
        notice: NoticeParams {
            deleted: query.deleted,
            kind: query.kind,
            bulk_deleted: query.bulk_deleted,
            bulk_errors: query.bulk_errors,
            error: query.error,
        },
    };

    (request, overrides)
}

/// Values of `key` or `key[]`, or `None` when the field is absent.
fn form_values(form: &[(String, String)], key: &str) -> Option<Vec<String>> {
    let array_key = format!("{key}[]");
    let values: Vec<String> = form
        .iter()
        .filter(|(k, _)| k == key || *k == array_key)
        .map(|(_, v)| v.clone())
        .collect();
    (!values.is_empty()).then_some(values)
}

async fn dispatch(
    state: AppState,
    method: Method,
    headers: HeaderMap,
    request: BrowseRequest,
    overrides: PreferenceOverrides,
) -> Response {
    let presented = session_id_from_headers(&headers, &state.cookie_name);
    let (session_id, is_new) = state.preferences.resume(presented);

    let span = tracing::info_span!(
        "request",
        method = %method,
        dir = %request.dir,
        session_id = %session_id,
    );

    async move {
        let update = state.preferences.load(&session_id).apply_overrides(&overrides);
        if update.changed {
            state.preferences.store(session_id, update.preferences);
        }

        let router = Arc::clone(&state.router);
        let prefs = update.preferences;
        let routed = tokio::task::spawn_blocking(move || router.handle(&request, &prefs))
            .await
            .map_err(|e| RouterError::Internal(e.to_string()));

        let mut response = match routed {
            Ok(RouterResponse::Redirect(location)) => {
                tracing::debug!(%location, "Redirecting");
                Redirect::to(&location).into_response()
            }
            Ok(RouterResponse::Listing(listing)) => Json(listing).into_response(),
            Ok(RouterResponse::File(target)) => {
                match RequestRouter::<SystemPermissions>::open_file(&target).await {
                    Ok(file) => file_response(file),
                    Err(e) => error_response(e),
                }
            }
            Err(e) => error_response(e),
        };

        if is_new {
            match HeaderValue::from_str(&session_cookie(&state.cookie_name, &session_id)) {
                Ok(cookie) => {
                    response.headers_mut().insert(header::SET_COOKIE, cookie);
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode session cookie"),
            }
        }

        response
    }
    .instrument(span)
    .await
}

fn file_response(file: FileResponse) -> Response {
    tracing::info!(
        file = %file.file_name,
        length = file.length,
        "Streaming file"
    );

    let headers = [
        (header::CONTENT_TYPE, file.content_type.clone()),
        (header::CONTENT_LENGTH, file.length.to_string()),
        (header::CONTENT_DISPOSITION, file.content_disposition()),
        (header::CACHE_CONTROL, "must-revalidate".to_string()),
    ];
    (headers, Body::from_stream(file.body)).into_response()
}

fn error_response(error: RouterError) -> Response {
    let status = match &error {
        RouterError::Transfer(TransferError::FileNotFound(_))
        | RouterError::Transfer(TransferError::IsADirectory(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(error = %error, status = %status, "Request failed");
    (status, status.canonical_reason().unwrap_or("error")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        let mut query = ListQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "dir" => query.dir = value,
                "sort" => query.sort = value,
                "hide_dotfiles" => query.hide_dotfiles = value,
                "bulk_download" => query.bulk_download = value,
                "bulk_delete" => query.bulk_delete = value,
                "type" => query.kind = value,
                "deleted" => query.deleted = value,
                other => panic!("unexpected key {other}"),
            }
        }
        query
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_browse_request_plain_listing() {
        let (request, overrides) =
            browse_request(query(&[("dir", "docs"), ("sort", "size"), ("hide_dotfiles", "0")]), None);

        assert_eq!(request.dir, "docs");
        assert!(request.bulk_download.is_none());
        assert_eq!(overrides.sort_column, Some(access::SortColumn::Size));
        assert_eq!(overrides.hide_dotfiles, Some(false));
        assert!(overrides.sort_order.is_none());
    }

    #[test]
    fn test_browse_request_notice_params() {
        let (request, _) = browse_request(query(&[("deleted", "a.txt"), ("type", "file")]), None);
        assert_eq!(request.notice.deleted.as_deref(), Some("a.txt"));
        assert_eq!(request.notice.kind.as_deref(), Some("file"));
    }

    #[test]
    fn test_browse_request_bulk_fields() {
        let form = pairs(&[("files[]", "a.txt"), ("files[]", "b.txt"), ("items", "c")]);

        let (request, _) = browse_request(query(&[("bulk_download", "1")]), Some(form.clone()));
        assert_eq!(
            request.bulk_download,
            Some(vec!["a.txt".to_string(), "b.txt".to_string()])
        );
        assert!(request.bulk_delete.is_none());

        let (request, _) = browse_request(query(&[("bulk_delete", "1")]), Some(form.clone()));
        assert_eq!(request.bulk_delete, Some(vec!["c".to_string()]));

        // Without the query flag the form is ignored
        let (request, _) = browse_request(ListQuery::default(), Some(form));
        assert!(request.bulk_download.is_none());
        assert!(request.bulk_delete.is_none());
    }

    #[test]
    fn test_form_values_absent() {
        assert!(form_values(&pairs(&[("other", "x")]), "files").is_none());
    }
}
