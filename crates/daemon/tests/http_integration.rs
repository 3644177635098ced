//! End-to-end tests for the HTTP surface.
//!
//! These tests run a real server on an ephemeral port against a temporary
//! home root:
//! - Listings, filtering and sticky preferences
//! - Traversal fallback
//! - Viewing and downloading files
//! - Single and bulk deletes

use std::path::Path;

use daemon::config::Config;
use daemon::http::{self, AppState};
use reqwest::header;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base: String,
    client: reqwest::Client,
    home: TempDir,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, query: &str) -> String {
        format!("{}/{}", self.base, query)
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.home.path().join(relative)
    }

    async fn get(&self, query: &str) -> reqwest::Response {
        self.client.get(self.url(query)).send().await.unwrap()
    }

    async fn listing(&self, query: &str, cookie: Option<&str>) -> Value {
        let mut request = self.client.get(self.url(query));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&response.text().await.unwrap()).unwrap()
    }
}

/// Populate a home root:
///
/// ```text
/// notes.txt      "hello world"
/// .profile
/// docs/readme.md
/// full/inner.txt
/// ```
fn populate(home: &Path) {
    std::fs::write(home.join("notes.txt"), "hello world").unwrap();
    std::fs::write(home.join(".profile"), "export X=1\n").unwrap();
    std::fs::create_dir(home.join("docs")).unwrap();
    std::fs::write(home.join("docs/readme.md"), "# docs\n").unwrap();
    std::fs::create_dir(home.join("full")).unwrap();
    std::fs::write(home.join("full/inner.txt"), "inner").unwrap();
}

async fn start_server() -> TestServer {
    let home = TempDir::new().unwrap();
    populate(home.path());

    let mut config = Config::default();
    config.browse.home_root = Some(home.path().to_path_buf());
    let state = AppState::from_config(&config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(http::serve(listener, state, async move {
        let _ = rx.await;
    }));

    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap();

    TestServer {
        base: format!("http://{addr}"),
        client,
        home,
        _shutdown: tx,
    }
}

fn entry_names(listing: &Value) -> Vec<String> {
    listing["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect()
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn session_cookie(response: &reqwest::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

// =============================================================================
// Listing Tests
// =============================================================================

#[tokio::test]
async fn test_healthz() {
    let server = start_server().await;
    let response = server.get("healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_root_listing() {
    let server = start_server().await;

    let response = server.get("").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("application/json"));
    assert!(session_cookie(&response).starts_with("homeshare_session="));

    let listing: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(listing["current_dir"], "");
    assert_eq!(listing["redirected_home"], false);
    assert_eq!(listing["truncated"], false);
    assert_eq!(entry_names(&listing), vec!["..", "docs", "full", "notes.txt"]);
    assert_eq!(listing["sort_links"][0]["column"], "name");
    assert_eq!(listing["sort_links"][0]["order"], "desc");

    let notes = &listing["entries"][3];
    assert_eq!(notes["size"], "11 bytes");
    assert_eq!(notes["path"], "notes.txt");
    assert_eq!(notes["is_directory"], false);
}

#[tokio::test]
async fn test_subdirectory_listing_and_breadcrumbs() {
    let server = start_server().await;

    let listing = server.listing("?dir=docs", None).await;
    assert_eq!(listing["current_dir"], "docs");
    assert_eq!(entry_names(&listing), vec!["..", "readme.md"]);
    assert_eq!(listing["entries"][1]["path"], "docs/readme.md");

    let crumbs = listing["breadcrumbs"].as_array().unwrap();
    assert_eq!(crumbs.len(), 2);
    assert_eq!(crumbs[1]["name"], "docs");
    assert_eq!(crumbs[1]["path"], "docs");
}

#[tokio::test]
async fn test_preferences_stick_to_session() {
    let server = start_server().await;

    let response = server.get("?hide_dotfiles=0&sort=name&order=desc").await;
    let cookie = session_cookie(&response);
    let listing: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(
        entry_names(&listing),
        vec!["..", "full", "docs", "notes.txt", ".profile"]
    );

    // Same session, no parameters: preferences persist
    let listing = server.listing("", Some(&cookie)).await;
    assert_eq!(listing["preferences"]["hide_dotfiles"], false);
    assert_eq!(listing["preferences"]["sort_order"], "desc");
    assert!(entry_names(&listing).contains(&".profile".to_string()));

    // Fresh session starts from defaults
    let listing = server.listing("", None).await;
    assert!(!entry_names(&listing).contains(&".profile".to_string()));
}

#[tokio::test]
async fn test_hide_directories() {
    let server = start_server().await;
    let listing = server.listing("?hide_dirs=1", None).await;
    assert_eq!(entry_names(&listing), vec!["..", "notes.txt"]);
}

#[tokio::test]
async fn test_symlink_outside_root_is_listed_read_only() {
    let server = start_server().await;
    let outside = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), server.path("elsewhere")).unwrap();

    let listing = server.listing("", None).await;
    let entry = listing["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "elsewhere")
        .cloned()
        .unwrap();
    assert_eq!(entry["is_symlink"], true);
    assert_eq!(entry["writable"], false);

    let notes = listing["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "notes.txt")
        .cloned()
        .unwrap();
    assert_eq!(notes["writable"], true);
}

#[tokio::test]
async fn test_traversal_falls_back_home() {
    let server = start_server().await;

    let listing = server.listing("?dir=../../etc", None).await;
    assert_eq!(listing["current_dir"], "");
    assert_eq!(listing["redirected_home"], true);
    assert!(entry_names(&listing).contains(&"notes.txt".to_string()));
}

#[tokio::test]
async fn test_notice_rendering() {
    let server = start_server().await;

    let listing = server.listing("?deleted=a.txt&type=file", None).await;
    assert_eq!(listing["notice"]["level"], "success");

    let listing = server.listing("?error=notempty", None).await;
    assert_eq!(listing["notice"]["level"], "danger");

    let listing = server.listing("", None).await;
    assert!(listing["notice"].is_null());
}

// =============================================================================
// Transfer Tests
// =============================================================================

#[tokio::test]
async fn test_view_text_file() {
    let server = start_server().await;

    let response = server.get("?view=notes.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"notes.txt\""
    );
    assert_eq!(response.text().await.unwrap(), "hello world");
}

#[tokio::test]
async fn test_download_file() {
    let server = start_server().await;

    let response = server.get("?dir=docs&download=readme.md").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"readme.md\""
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "must-revalidate");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "7");
    assert_eq!(response.text().await.unwrap(), "# docs\n");
}

#[tokio::test]
async fn test_download_name_with_control_character() {
    let server = start_server().await;
    std::fs::write(server.path("odd\u{7}.txt"), "odd").unwrap();

    let response = server.get("?download=odd%07.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"odd_.txt\""
    );
    assert_eq!(response.text().await.unwrap(), "odd");
}

#[tokio::test]
async fn test_download_traversal_is_listing() {
    let server = start_server().await;

    // Traversal sequences are stripped; the missing file falls through to the listing
    let response = server.get("?download=../../etc/passwd").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("application/json"));
}

#[tokio::test]
async fn test_bulk_download_single_file() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url("?bulk_download=1"))
        .form(&[("files[]", "notes.txt")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
}

#[tokio::test]
async fn test_bulk_download_multiple_refused() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url("?dir=&bulk_download=1"))
        .form(&[("files[]", "notes.txt"), ("files[]", ".profile")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "?dir=&error=bulkdownload");
}

// =============================================================================
// Mutation Tests
// =============================================================================

#[tokio::test]
async fn test_delete_file_redirects() {
    let server = start_server().await;

    let response = server.get("?dir=docs&delete=readme.md").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "?dir=docs&deleted=readme.md&type=file");
    assert!(!server.path("docs/readme.md").exists());
}

#[tokio::test]
async fn test_delete_empty_directory() {
    let server = start_server().await;
    std::fs::create_dir(server.path("scratch")).unwrap();

    let response = server.get("?delete=scratch").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "?dir=&deleted=scratch&type=directory");
    assert!(!server.path("scratch").exists());
}

#[tokio::test]
async fn test_delete_non_empty_directory_refused() {
    let server = start_server().await;

    let response = server.get("?delete=full").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "?dir=&error=notempty");
    assert!(server.path("full/inner.txt").exists());
}

#[tokio::test]
async fn test_bulk_delete_partial() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url("?dir=&bulk_delete=1"))
        .form(&[
            ("items[]", "notes.txt"),
            ("items[]", "full"),
            ("items[]", "missing.txt"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "?dir=&bulk_deleted=1&bulk_errors=2");
    assert!(!server.path("notes.txt").exists());
    assert!(server.path("full").exists());
}

#[tokio::test]
async fn test_bulk_delete_requires_query_flag() {
    let server = start_server().await;

    let response = server
        .client
        .post(server.url(""))
        .form(&[("items[]", "notes.txt")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.path("notes.txt").exists());
}
