//! Delfos sender
//!
//! Announces this host, collects peers, and serves the control surface
//! from which a streaming session is started and stopped.
//!
//! Usage: `delfos [--simulate]`

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use delfos::{
    audio::{CaptureBackend, CpalBackend, SimulatedBackend},
    config::AppConfig,
    discovery::{PeerRegistry, PresenceAnnouncer, PresenceListener},
    network::detect_local_address,
    session::SessionController,
    ui::{AppState, WebServer},
};

/// Test tone used with `--simulate`
const SIMULATED_TONE_HZ: f64 = 440.0;
const SIMULATED_TONE_AMPLITUDE: i16 = 8000;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Delfos");

    let simulate = std::env::args().skip(1).any(|arg| arg == "--simulate");
    let config = AppConfig::load()?;

    let backend: Arc<dyn CaptureBackend> = if simulate {
        tracing::info!("Using simulated capture device");
        Arc::new(SimulatedBackend::tone(SIMULATED_TONE_HZ, SIMULATED_TONE_AMPLITUDE))
    } else {
        Arc::new(CpalBackend::new(config.audio.queue_capacity))
    };

    // List available devices
    println!("\n=== Capture Devices ===");
    match backend.list_input_devices() {
        Ok(devices) => {
            for device in &devices {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}{}", device.name, default_marker);
                println!("    ID: {}", device.id);
                println!("    Max input channels: {}", device.max_input_channels);
            }
        }
        Err(e) => tracing::warn!("Could not enumerate capture devices: {}", e),
    }
    println!();

    let own_address = match config.discovery.advertise_address.clone() {
        Some(address) => Some(address),
        None => match detect_local_address() {
            Ok(ip) => Some(ip.to_string()),
            Err(e) => {
                tracing::warn!("No LAN address detected, not announcing: {}", e);
                None
            }
        },
    };

    let registry = Arc::new(PeerRegistry::with_audio_port(config.network.audio_port));

    // Without the listener the peer list stays empty; everything else works
    let listener = match PresenceListener::spawn(
        config.discovery.listener(own_address.as_deref()),
        registry.clone(),
    ) {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::error!("Peer discovery unavailable: {}", e);
            None
        }
    };

    let announcer = match own_address.as_deref() {
        Some(address) => match PresenceAnnouncer::spawn(config.discovery.announcer(address)) {
            Ok(announcer) => {
                tracing::info!("Announcing {} to the local network", address);
                Some(announcer)
            }
            Err(e) => {
                tracing::error!("Presence announcements unavailable: {}", e);
                None
            }
        },
        None => None,
    };

    let controller = Arc::new(SessionController::with_config(
        backend,
        config.audio.clone(),
        config.network.clone(),
    ));

    let state = AppState::new(controller.clone(), registry);
    let web_server = WebServer::new(config.ui.clone(), state);
    tracing::info!("Control surface at http://{}", web_server.address());
    let _web_handle = web_server.start_background();

    tracing::info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    tokio::task::spawn_blocking(move || controller.shutdown()).await?;
    if let Some(announcer) = announcer {
        announcer.shutdown();
    }
    if let Some(listener) = listener {
        listener.shutdown();
    }

    Ok(())
}
