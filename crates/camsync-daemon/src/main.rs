//! camsync Daemon - Main entry point
//!
//! Registers the configured cameras, runs coordinator cycles on a fixed
//! cadence and serves the status API.

mod api;
mod config;
mod firmware_fetch;
mod media;
mod observer;
mod server;
mod sim;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "camsync")]
#[command(about = "Camera hierarchy synchronization daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camsync.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single cycle per camera, print the reports and exit
    #[arg(long)]
    once: bool,
}

#[derive(Serialize)]
struct OnceOutput {
    session: camsync_coordinator::SessionId,
    host: String,
    report: camsync_coordinator::CycleReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("camsync v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        cameras = config.cameras.len(),
        motion_sensor = config.features.motion_sensor,
        time_sync = config.features.time_sync,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone()).await?;

    if args.once {
        info!("Running a single cycle per session");
        let mut output = Vec::new();
        for view in state.sessions().await {
            if let Some(report) = state.run_cycle(view.id).await {
                output.push(OnceOutput {
                    session: view.id,
                    host: view.host,
                    report,
                });
            }
        }
        state.shutdown().await;
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        server::run(state, &config.daemon.bind, config.daemon.tls.as_ref()).await?;
    }

    Ok(())
}
