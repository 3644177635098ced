//! Homeshare Daemon
//!
//! Serves the caller's home directory tree over HTTP.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::http::{self, AppState};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Homeshare - browse a home directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "homeshare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long, short, value_name = "ADDR")]
        bind: Option<String>,

        /// Directory to serve instead of the caller's home
        #[arg(long, value_name = "DIR")]
        home: Option<PathBuf>,
    },

    /// Resolve a client path the way the server would and print the result
    Resolve {
        /// Path relative to the home root
        #[arg(default_value = "")]
        path: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    if let Commands::Serve { bind, home } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.clone();
        }
        if let Some(home) = home {
            config.browse.home_root = Some(home.clone());
        }
    }

    // Validate configuration
    config.validate()?;

    let _log_guard = init_tracing(&config, cli.verbose)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Serve { .. } => run_server(config).await,
        Commands::Resolve { path, json } => resolve_path(&config, &path, json),
        Commands::Config => {
            println!("# {}", default_config_path().display());
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr; when `daemon.log_dir` is set they are also written to a
/// daily rotated file. The returned guard flushes the file writer on drop.
fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug"
    } else {
        config.daemon.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.daemon.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "homeshare.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Homeshare daemon starting...");

    let addr = config.bind_addr()?;
    let state = AppState::from_config(&config)?;
    state
        .preferences()
        .start_cleanup_task(config.session.idle_timeout);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    http::serve(listener, state, async {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!("Signal handling failed: {}", e);
        }
        tracing::info!("Received shutdown signal");
    })
    .await
    .context("HTTP server error")?;

    tracing::info!("Homeshare daemon stopped");
    Ok(())
}

fn resolve_path(config: &Config, path: &str, json: bool) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let location = state.resolve(path);

    if json {
        println!("{}", serde_json::to_string_pretty(&location)?);
        return Ok(());
    }

    println!("Requested:  {}", location.raw_path);
    println!("Directory:  {}", location.resolved_path.display());
    println!("Granted:    {}", location.access_granted);
    println!("Reason:     {:?}", location.access_reason);
    println!("Outside:    {}", location.is_outside_root);
    if let Some(target) = &location.symlink_target {
        println!("Link:       {}", target.display());
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
