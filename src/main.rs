//! Media Bridge — keeps a media server session alive over a persistent
//! websocket and plays the server's remote-control commands on a local
//! audio player.
//!
//! ## Moving parts
//! 1. **Link**: a background thread holds the websocket open, heartbeats it,
//!    and reconnects forever on failure.
//! 2. **Engine**: each track runs as a child player process; a watcher thread
//!    reports its state changes.
//! 3. **Synchronizer**: the main thread drains one event channel fed by both
//!    and keeps the queue, position, and server-side session in sync.

mod config;
mod engine;
mod events;
mod link;
mod position;
mod protocol;
mod queue;
mod report;
mod stream_url;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::events::BridgeEvent;

#[derive(Parser, Debug)]
#[command(name = "media-bridge", version)]
struct Args {
    /// Path to the TOML config file (defaults to config.toml next to the binary)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,media_bridge=info")),
        )
        .init();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let cfg = config::BridgeConfig::load(&config_path)?;
    let address = config::server_address_from_config(&cfg)?;
    let device_id = config::device_id_from_config(&cfg);
    let player_command = config::player_command_from_config(&cfg)?;
    let token = cfg.server.token.clone();
    tracing::info!(server = %address, device_id = %device_id, player = %player_command[0], "starting");

    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let shutdown_tx = events_tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(BridgeEvent::Shutdown);
    })
    .context("install signal handler")?;

    let reporter = report::HttpReporter::spawn(address.clone(), token.clone());
    let engine = engine::ProcessEngine::new(player_command, events_tx.clone());

    let link = Arc::new(link::DuplexLink::new(
        address.clone(),
        token.clone(),
        device_id,
        events_tx,
    ));
    link.open();

    let mut synchronizer = sync::Synchronizer::new(
        stream_url::StreamUrl::new(address, token),
        Box::new(engine),
        Box::new(reporter),
    );
    synchronizer.run(events_rx);

    tracing::info!("stopped");
    Ok(())
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locate executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable has no parent directory"))?;
    Ok(dir.join("config.toml"))
}
