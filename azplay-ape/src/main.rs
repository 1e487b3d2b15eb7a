//! azplay-ape - Audio Playout Engine entry point
//!
//! Subcommands:
//! - `run` (default): play the configured playlist forever
//! - `devices`: list output devices as `index: name`
//! - `check`: validate catalog and playlist, print the resolved schedule

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use azplay_ape::api::{self, AppContext};
use azplay_ape::audio::{list_devices, CpalDevice, OutputDevice, SymphoniaOpener};
use azplay_ape::config::{Config, Overrides};
use azplay_ape::playback::scheduler::next_index;
use azplay_ape::playback::{
    pacing_delay, BroadcastTransport, LogTransport, PadPublisher, Playlist, PlayoutEngine,
    Scheduler, SystemClock, TelemetryEmitter, TelemetryTransport,
};
use azplay_ape::ShutdownSignal;
use azplay_common::Catalog;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for azplay-ape
#[derive(Parser, Debug)]
#[command(name = "azplay-ape")]
#[command(about = "Broadcast audio playout engine")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "AZPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog JSON document
    #[arg(long, env = "AZPLAY_CATALOG")]
    catalog: Option<PathBuf>,

    /// Playlist file
    #[arg(long, env = "AZPLAY_PLAYLIST")]
    playlist: Option<PathBuf>,

    /// Output device index (see `devices`)
    #[arg(short, long)]
    device: Option<usize>,

    /// SSE/API listen address
    #[arg(long)]
    bind: Option<String>,

    /// Streaming buffer depth in blocks
    #[arg(long)]
    buffer_blocks: Option<usize>,

    /// Frames per device callback
    #[arg(long)]
    block_frames: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Play the playlist until interrupted
    Run,
    /// List audio output devices
    Devices,
    /// Validate catalog and playlist without playing
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        catalog_file: args.catalog.clone(),
        playlist_file: args.playlist.clone(),
        output_device: args.device,
        bind: args.bind.clone(),
        buffer_blocks: args.buffer_blocks,
        block_frames: args.block_frames,
    };
    let config = Config::load(args.config.as_deref(), overrides).context("Failed to load configuration")?;

    init_tracing(&config.toml.logging.level);
    info!("{}", azplay_ape::build_info());
    match &config.source {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Devices => print_devices(),
        Command::Check => check(&config),
    }
}

fn init_tracing(level: &str) {
    let default = format!("azplay_ape={level},azplay_common={level},tower_http=info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: Config) -> Result<()> {
    let catalog = Catalog::load(&config.toml.catalog_file).context("Failed to load catalog")?;
    let playlist =
        Playlist::load(&config.toml.playlist_file, &catalog).context("Failed to load playlist")?;
    if playlist.is_empty() {
        bail!(
            "Playlist {} has no playable entries",
            config.toml.playlist_file.display()
        );
    }

    let shutdown = Arc::new(ShutdownSignal::new());

    let device: Arc<dyn OutputDevice> = Arc::new(
        CpalDevice::new(config.toml.output_device).context("Failed to open output device")?,
    );

    let broadcaster = config
        .toml
        .telemetry
        .bind
        .as_ref()
        .map(|_| BroadcastTransport::new(config.toml.telemetry.capacity));
    let transport: Arc<dyn TelemetryTransport> = match &broadcaster {
        Some(b) => Arc::new(b.clone()),
        None => Arc::new(LogTransport),
    };
    let emitter = Arc::new(TelemetryEmitter::new(config.toml.origin.clone(), transport));

    let engine = Arc::new(PlayoutEngine::new(
        config.session_config(),
        device,
        Arc::new(SymphoniaOpener),
        emitter,
        Arc::clone(&shutdown),
    ));

    let server = match (config.toml.telemetry.bind.clone(), broadcaster) {
        (Some(bind), Some(telemetry)) => {
            let ctx = AppContext {
                engine: Arc::clone(&engine),
                telemetry,
            };
            let shutdown = Arc::clone(&shutdown);
            Some(tokio::spawn(async move { api::serve(&bind, ctx, shutdown).await }))
        }
        _ => None,
    };

    let mut pad = PadPublisher::new(config.toml.pad_file.clone());
    if let Some(url) = &config.toml.pad.http_url {
        pad = pad
            .with_http(url.clone(), tokio::runtime::Handle::current())
            .context("Failed to configure PAD HTTP output")?;
    }

    let mut scheduler = Scheduler::new(
        playlist,
        Arc::clone(&engine),
        SystemClock::new(Arc::clone(&shutdown)),
        Arc::clone(&shutdown),
    )
    .with_pad(pad);

    let scheduler_thread = {
        let shutdown = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || {
                let result = scheduler.run();
                shutdown.trigger("scheduler stopped");
                result
            })
            .context("Failed to spawn scheduler thread")?
    };

    let internal = {
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || shutdown.wait())
    };
    tokio::select! {
        _ = shutdown_signal() => shutdown.trigger("signal received"),
        _ = internal => {}
    }

    match tokio::task::spawn_blocking(move || scheduler_thread.join()).await {
        Ok(Ok(Ok(()))) => info!("Scheduler stopped"),
        Ok(Ok(Err(e))) => error!("Scheduler failed: {}", e),
        Ok(Err(_)) => error!("Scheduler thread panicked"),
        Err(e) => error!("Failed to join scheduler thread: {}", e),
    }

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("API server: {}", e),
            Err(e) => warn!("API server task failed: {}", e),
        }
    }

    info!(
        "Shutdown complete ({})",
        shutdown.reason().unwrap_or_else(|| "unknown".to_string())
    );
    Ok(())
}

fn print_devices() -> Result<()> {
    let devices = list_devices().context("Failed to enumerate output devices")?;
    if devices.is_empty() {
        println!("No output devices found");
    }
    for device in devices {
        println!(
            "{}: {}",
            device.index.map_or_else(|| "-".to_string(), |i| i.to_string()),
            device.name.unwrap_or_else(|| "(unnamed)".to_string())
        );
    }
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let catalog = Catalog::load(&config.toml.catalog_file).context("Failed to load catalog")?;
    let playlist =
        Playlist::load(&config.toml.playlist_file, &catalog).context("Failed to load playlist")?;

    println!(
        "Catalog {}: {} cuts, {} rejected, categories: {}",
        config.toml.catalog_file.display(),
        catalog.len(),
        catalog.rejected().len(),
        catalog.categories().join(", ")
    );
    for rejected in catalog.rejected() {
        println!("  rejected cut {}: {}", rejected.key, rejected.reason);
    }

    println!(
        "Playlist {}: {} entries, {} skipped",
        config.toml.playlist_file.display(),
        playlist.len(),
        playlist.skipped().len()
    );
    for skipped in playlist.skipped() {
        println!("  line {}: {}", skipped.line, skipped.reason);
    }

    let entries = playlist.entries();
    for entry in entries {
        let next = &entries[next_index(entry.index, entries.len())];
        println!(
            "{:>4}  {:<8} {:<6} {:<5} next in {:>8} ms  {}",
            entry.index,
            entry.cut.id,
            entry.eof_action.as_str(),
            if entry.cut.topplay { "top" } else { "" },
            pacing_delay(&entry.cut, &next.cut).as_millis(),
            entry.cut.display_line()
        );
    }

    if playlist.is_empty() {
        bail!("Playlist has no playable entries");
    }
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
