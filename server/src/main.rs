//! `rallyd` - HTTP facade over the rally benchmarking toolkit.
//!
//! ```text
//! main() -> load config -> RallyCli (spawns rally) -> axum::serve
//!                                                      |
//!                                   ctrl-c / SIGTERM   v
//!                               graceful shutdown -> abort background jobs
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rallyd_config::{ENV_CONFIG, RallydConfig};
use rallyd_engine::{JobTracker, RallyCli, RallyCliSettings};
use rallyd_server::{AppState, serve};

#[derive(Debug, Parser)]
#[command(name = "rallyd", version, about = "HTTP facade over the rally benchmarking toolkit")]
struct Args {
    /// Config file (default: ~/.rallyd/config.toml).
    #[arg(long, env = ENV_CONFIG)]
    config: Option<PathBuf>,
    /// Address to listen on, overriding the config file.
    #[arg(long)]
    bind: Option<String>,
    /// Working directory for logs and reports, overriding the config file.
    #[arg(long)]
    workdir: Option<PathBuf>,
}

fn init_tracing(log_path: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let file = log_path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(log_path));

    match file {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %log_path.display(), "Logging initialized");
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(env_filter)
                .init();
            tracing::warn!("Failed to open log file {}: {e}", log_path.display());
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RallydConfig::load_from(path),
        None => RallydConfig::load(),
    }
    .with_context(|| "Failed to load rallyd config")?;

    let mut settings = RallyCliSettings::from_config(&config);
    if let Some(workdir) = &args.workdir {
        settings.workdir.clone_from(workdir);
    }
    let log_path = match &args.workdir {
        Some(workdir) => workdir.join(rallyd_config::DEFAULT_LOG_FILE_NAME),
        None => config.log_file(),
    };
    init_tracing(&log_path);

    let jobs = Arc::new(JobTracker::new());
    let backend = Arc::new(RallyCli::new(settings, Arc::clone(&jobs)));
    let workdir = backend.workdir().clone();
    workdir
        .ensure()
        .await
        .with_context(|| format!("Failed to create workdir {}", workdir.root().display()))?;

    for missing in backend.missing_binaries() {
        tracing::warn!(binary = %missing, "Toolkit executable not found on PATH");
    }

    let bind = args.bind.unwrap_or_else(|| config.bind());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(
        addr = %bind,
        workdir = %workdir.root().display(),
        "rallyd listening"
    );

    let state = AppState::new(backend, workdir);
    serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    let pending = jobs.len().await;
    if pending > 0 {
        tracing::info!(pending, "Waiting for background jobs");
    }
    jobs.shutdown(config.shutdown_grace()).await;
    tracing::info!("rallyd stopped");
    Ok(())
}
