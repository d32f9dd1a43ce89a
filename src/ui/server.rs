//! HTTP control surface
//!
//! Stands in for a desktop window: device and peer pickers, a gain
//! slider and a start/stop toggle, plus a WebSocket for live updates.

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::discovery::{PeerEvent, PeerRegistry};
use crate::session::{SessionController, SessionEvent};
use crate::ui::{handlers, websocket};

/// Buffered UI events per WebSocket client before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pushed to WebSocket clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum UiEvent {
    PeerDiscovered { host: String },
    PeerExpired { host: String },
    Session(SessionEvent),
}

impl From<&PeerEvent> for UiEvent {
    fn from(event: &PeerEvent) -> Self {
        match event {
            PeerEvent::Discovered(peer) => UiEvent::PeerDiscovered {
                host: peer.host().to_string(),
            },
            PeerEvent::Expired(peer) => UiEvent::PeerExpired {
                host: peer.host().to_string(),
            },
        }
    }
}

/// Shared state for handlers
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub registry: Arc<PeerRegistry>,
    pub events: broadcast::Sender<UiEvent>,
    pub started_at: Instant,
}

impl AppState {
    /// Build the state and forward registry and session events to it
    pub fn new(controller: Arc<SessionController>, registry: Arc<PeerRegistry>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let tx = events.clone();
        registry.subscribe(move |event| {
            let _ = tx.send(UiEvent::from(event));
        });

        let tx = events.clone();
        controller.subscribe(move |event| {
            let _ = tx.send(UiEvent::Session(event.clone()));
        });

        Arc::new(Self {
            controller,
            registry,
            events,
            started_at: Instant::now(),
        })
    }
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/peers", get(handlers::get_peers))
        .route("/api/gain", get(handlers::get_gain).put(handlers::set_gain))
        .route("/api/session/start", post(handlers::start_session))
        .route("/api/session/stop", post(handlers::stop_session))
        .route("/ws", get(websocket::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server for the control surface
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.http_port)
    }

    /// Serve until the task is dropped or the listener fails
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.address();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Control surface listening on http://{}", addr);
        axum::serve(listener, router(self.state)).await
    }

    /// Spawn the server on the current runtime
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Web server error: {}", e);
            }
        })
    }
}
