//! # Homeshare Daemon Library
//!
//! HTTP front end for browsing a home directory tree. All authorization
//! decisions are made by the [`access`] crate; this crate turns requests into
//! access operations and their outcomes into HTTP responses.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HTTP (axum)                           │
//! │        GET / · POST / · GET /healthz · session cookie       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌──────────────┐  │
//! │  │  Request Router  │  │  Preference  │  │     File     │  │
//! │  │ (action dispatch)│  │    Store     │  │   Transfer   │  │
//! │  └────────┬─────────┘  └──────────────┘  └──────────────┘  │
//! │           │                                                 │
//! │  ┌────────▼────────────────────────────────────────────┐   │
//! │  │  access: resolver · scanner · view · mutation        │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let state = AppState::from_config(&config)?;
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
//!     daemon::http::serve(listener, state, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`http`]: axum routes, session cookie, response mapping
//! - [`router`]: Action precedence and redirect construction
//! - [`session`]: Per-session view preferences
//! - [`transfer`]: Content-type detection and file streaming

pub mod config;
pub mod http;
pub mod router;
pub mod session;
pub mod transfer;

// Re-export the access crate for convenience
pub use access;

pub use config::Config;
pub use http::{build_router, AppState};
pub use router::{
    BrowseRequest, ListingResponse, RequestRouter, RouterError, RouterResponse, RouterResult,
    RouterSettings,
};
pub use session::{PreferenceStore, SessionId};
pub use transfer::{Disposition, FileResponse, FileTransfer, TransferError};
