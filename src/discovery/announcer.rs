//! Periodic presence broadcasts

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::constants::{DEFAULT_ANNOUNCE_INTERVAL_MS, DEFAULT_PORT};
use crate::discovery::format_announcement;
use crate::error::NetworkError;
use crate::network::broadcast_socket;

/// Announcer settings
#[derive(Debug, Clone)]
pub struct AnnouncerConfig {
    /// Where announcements go, normally the broadcast address
    pub target: SocketAddr,
    pub interval: Duration,
    /// Address peers should send audio to
    pub advertise_address: String,
}

impl AnnouncerConfig {
    pub fn broadcast(advertise_address: impl Into<String>) -> Self {
        Self {
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DEFAULT_PORT),
            interval: Duration::from_millis(DEFAULT_ANNOUNCE_INTERVAL_MS),
            advertise_address: advertise_address.into(),
        }
    }
}

/// Broadcasts this host's presence on a fixed interval
pub struct PresenceAnnouncer {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    message: Arc<str>,
    sent: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PresenceAnnouncer {
    /// Announce once right away, then every `interval`
    pub fn spawn(config: AnnouncerConfig) -> Result<Self, NetworkError> {
        let socket = Arc::new(broadcast_socket()?);
        let message: Arc<str> = format_announcement(&config.advertise_address).into();
        let sent = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let loop_socket = socket.clone();
        let loop_message = message.clone();
        let loop_sent = sent.clone();
        let target = config.target;
        let interval = config.interval;

        let handle = thread::Builder::new()
            .name("presence-announcer".to_string())
            .spawn(move || loop {
                announce(&loop_socket, target, &loop_message, &loop_sent);
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        tracing::info!(
            "Announcing {} to {} every {:?}",
            config.advertise_address,
            target,
            interval
        );

        Ok(Self {
            socket,
            target,
            message,
            sent,
            stop_tx: Some(stop_tx),
            thread_handle: Some(handle),
        })
    }

    /// Send an announcement now, outside the schedule
    pub fn announce_now(&self) -> Result<(), NetworkError> {
        self.socket
            .send_to(self.message.as_bytes(), self.target)
            .map(|_| {
                self.sent.fetch_add(1, Ordering::Relaxed);
            })
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    /// Announcements sent so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the loop
        self.stop_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PresenceAnnouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn announce(socket: &UdpSocket, target: SocketAddr, message: &str, sent: &AtomicU64) {
    match socket.send_to(message.as_bytes(), target) {
        Ok(_) => {
            sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => tracing::debug!("Announcement to {} failed: {}", target, e),
    }
}
