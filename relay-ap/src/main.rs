//! PCM relay player (relay-ap) - Main entry point
//!
//! Logs in to the session, loads one track and plays it on the audio device
//! until the track ends, a signal arrives, or the pipeline fails.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_ap::audio::output::CpalSink;
use relay_ap::config::{default_log_filter, resolve_log_level, CliOverrides, PlayerConfig};
use relay_ap::playback::Pipeline;
use relay_ap::session::{read_application_key, PcmFileSession, Session};
use relay_common::config::TomlConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for relay-ap
#[derive(Parser, Debug)]
#[command(name = "relay-ap")]
#[command(about = "Plays streamed 16-bit PCM on the local audio device")]
#[command(version)]
struct Args {
    /// Application key file
    #[arg(short, long, env = "RELAY_KEY_PATH")]
    key: Option<PathBuf>,

    /// Account username
    #[arg(short, long, env = "RELAY_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(short, long, env = "RELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Output device name (default device if omitted)
    #[arg(long, env = "RELAY_DEVICE")]
    device: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Track URI to play
    #[arg(required_unless_present = "list_devices")]
    uri: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    let level = resolve_log_level(&file_config, args.debug).context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(&level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "relay-ap {} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to enumerate audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = PlayerConfig::resolve(
        &file_config,
        CliOverrides {
            key_path: args.key,
            username: args.username,
            password: args.password,
            uri: args.uri,
            device: args.device,
            debug: args.debug,
        },
    )
    .context("Invalid configuration")?;

    // The local session runs without a key; a configured one must load
    let application_key = match &config.key_path {
        Some(path) => Some(read_application_key(path).context("Failed to load application key")?),
        None => None,
    };

    let mut session = PcmFileSession::new(application_key);
    session
        .login(&config.credentials)
        .context("Login failed")?;
    let track = session
        .load(&config.uri)
        .with_context(|| format!("Failed to load {}", config.uri))?;
    info!("Playing {}", track.uri);

    let output = config.output.clone();
    let pipeline = Pipeline::start(&config.pipeline, move || CpalSink::open(&output))
        .await
        .context("Failed to start audio output")?;

    let track_done = CancellationToken::new();
    session
        .play(pipeline.consumer(), track_done.clone())
        .context("Failed to start playback")?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = track_done.cancelled() => {
            info!("Track fully delivered, draining");
        }
        _ = pipeline.stopping() => {}
    }

    track_done.cancel();
    pipeline.shutdown();
    pipeline.wait().await.context("Playback failed")?;

    info!("Playback finished");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
