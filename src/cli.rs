//! # listsync CLI interface
//!
//! CLI glue only: argument parsing, wiring the Keep and iCloud clients into the
//! core sync pass, the daemon loop and the list API server. Business logic lives
//! in `listsync-core`.
//!
//! - [`Cli`] defines the user-facing options and subcommands.
//! - [`run`] is the async entrypoint used by `main` and by integration tests.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listsync_core::contract::NoteSource;
use listsync_core::schedule::run_periodic;
use listsync_core::snapshot::load_snapshot;
use listsync_core::synchronise::{synchronise, SynchroniseReport};

use crate::icloud::{ICloudCredentials, ICloudEndpoints, ICloudSession, RemindersClient};
use crate::keep::{KeepClient, KeepEndpoints};
use crate::load_config::{load_config, AppConfig};
use crate::server::{self, AppState, REFRESH_PERIOD};

/// Mirror Google Keep checklists into iCloud Reminders.
#[derive(Parser)]
#[clap(
    name = "listsync",
    version,
    about = "Mirror unchecked Google Keep list items into iCloud Reminders, and serve Keep lists over HTTP"
)]
pub struct Cli {
    /// Optional YAML file with list pairs and the sync interval
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync once at startup and then on every interval, until interrupted
    Sync {
        /// Run a single pass and exit
        #[clap(long)]
        once: bool,
    },
    /// Serve the Keep lists over HTTP
    Serve {
        /// Port to listen on (defaults to SERVER_PORT, then 5000)
        #[clap(long)]
        port: Option<u16>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Sync { once: true } => {
            let icloud = config.require_icloud()?;
            tracing::info!(command = "sync", "Starting single synchronisation pass");
            let report = sync_pass(&config, icloud).await?;
            tracing::info!(command = "sync", ?report, "Synchronisation complete");
            Ok(())
        }
        Commands::Sync { once: false } => run_daemon(&config).await,
        Commands::Serve { port } => serve(config, port).await,
    }
}

/// Log in to both services and run one pass over every configured pair.
pub async fn sync_pass(config: &AppConfig, icloud: &ICloudCredentials) -> Result<SynchroniseReport> {
    let keep = KeepClient::login(&config.keep, KeepEndpoints::default())
        .await
        .context("Could not authenticate to Google Keep")?;
    let session = ICloudSession::login(icloud, ICloudEndpoints::default())
        .await
        .context("Could not connect to iCloud")?;
    let reminders = RemindersClient::new(session)?;
    synchronise(&config.pairs, &keep, &reminders)
        .await
        .map_err(anyhow::Error::msg)
}

async fn run_daemon(config: &AppConfig) -> Result<()> {
    let icloud = config.require_icloud()?;
    let period = config
        .interval_minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .context("Sync interval is too large")?;
    tracing::info!(
        command = "sync",
        interval_minutes = config.interval_minutes,
        "Starting initial sync, then scheduling"
    );

    let runs = run_periodic(period, shutdown_signal(), move || async move {
        match sync_pass(config, icloud).await {
            Ok(report) => {
                tracing::info!(total_added = report.total_added, "Synchronisation complete")
            }
            Err(e) => tracing::error!(error = %e, "Synchronisation failed; skipping this run"),
        }
    })
    .await;

    tracing::info!(runs, "Sync daemon stopped");
    Ok(())
}

async fn serve(config: AppConfig, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server_port);
    let keep = KeepClient::login(&config.keep, KeepEndpoints::default())
        .await
        .context("Could not authenticate to Google Keep")?;
    let source: Arc<dyn NoteSource> = Arc::new(keep);

    let snapshot = load_snapshot(source.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load Google Keep lists: {e}"))?;
    tracing::info!(lists = snapshot.len(), "Loaded lists from Google Keep");

    let state = Arc::new(AppState::new(source, snapshot, config.sync_list_names));
    let refresher = tokio::spawn(server::refresh_periodically(state.clone(), REFRESH_PERIOD));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(port, "List API listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("List API server failed")?;

    refresher.abort();
    tracing::info!("List API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}
