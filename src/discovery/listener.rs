//! Background receiver for presence announcements

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::constants::{DEFAULT_PORT, MAX_DISCOVERY_DATAGRAM};
use crate::discovery::{parse_announcement, PeerRegistry};
use crate::error::{FormatError, NetworkError};
use crate::network::bind_discovery_socket;

/// Listener settings
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// How often the loop wakes without traffic
    pub read_timeout: Duration,
    /// Forget peers silent for this long; `None` keeps them forever
    pub peer_ttl: Option<Duration>,
    /// Announced addresses to drop, normally this host's own
    pub ignored_addresses: Vec<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            read_timeout: Duration::from_millis(500),
            peer_ttl: None,
            ignored_addresses: Vec::new(),
        }
    }
}

/// Apply one received datagram to the registry
///
/// Returns whether a new peer was added.
pub fn handle_datagram(
    registry: &PeerRegistry,
    payload: &[u8],
    ignored_addresses: &[String],
) -> Result<bool, FormatError> {
    let address = parse_announcement(payload)?;
    if ignored_addresses.iter().any(|a| a == address) {
        return Ok(false);
    }
    Ok(registry.observe(address))
}

/// Discovery receive loop running on its own thread
pub struct PresenceListener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    datagrams_received: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PresenceListener {
    /// Bind the discovery port and start listening
    ///
    /// A bind failure is returned to the caller and not retried.
    pub fn spawn(config: ListenerConfig, registry: Arc<PeerRegistry>) -> Result<Self, NetworkError> {
        let bind = SocketAddr::new(config.bind_address, config.port);
        let socket = bind_discovery_socket(bind, config.read_timeout)?;
        let local_addr = socket.local_addr().map_err(|e| NetworkError::BindFailed {
            port: config.port,
            reason: e.to_string(),
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let datagrams_received = Arc::new(AtomicU64::new(0));

        let loop_running = running.clone();
        let loop_count = datagrams_received.clone();
        let handle = thread::Builder::new()
            .name("presence-listener".to_string())
            .spawn(move || receive_loop(socket, config, registry, loop_running, loop_count))
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        tracing::info!("Listening for peers on {}", local_addr);

        Ok(Self {
            local_addr,
            running,
            datagrams_received,
            thread_handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for it, at most one read timeout
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PresenceListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(
    socket: UdpSocket,
    config: ListenerConfig,
    registry: Arc<PeerRegistry>,
    running: Arc<AtomicBool>,
    datagrams_received: Arc<AtomicU64>,
) {
    let mut buf = [0u8; MAX_DISCOVERY_DATAGRAM];

    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                datagrams_received.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = handle_datagram(&registry, &buf[..n], &config.ignored_addresses) {
                    // Audio datagrams share the port, so this is routine
                    tracing::trace!("Ignoring {} byte datagram from {}: {}", n, from, e);
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::debug!("Discovery receive failed: {}", e);
            }
        }

        if let Some(ttl) = config.peer_ttl {
            registry.expire_older_than(ttl);
        }
    }

    tracing::debug!("Presence listener stopped");
}
