//! Ordered, deduplicated list of discovered peers

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_PORT;
use crate::discovery::PeerEndpoint;
use crate::observer::Observers;

/// A known peer with discovery timestamps
#[derive(Debug, Clone, Serialize)]
pub struct PeerEntry {
    pub endpoint: PeerEndpoint,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    refreshed_at: Instant,
}

/// Registry changes delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Discovered(PeerEndpoint),
    Expired(PeerEndpoint),
}

/// Peers in first-seen order, unique by host string
///
/// Written only by the discovery listener thread; readers always see a
/// complete snapshot.
pub struct PeerRegistry {
    peers: RwLock<Vec<PeerEntry>>,
    observers: Observers<PeerEvent>,
    audio_port: u16,
}

impl PeerRegistry {
    /// Registry whose endpoints point at the default audio port
    pub fn new() -> Self {
        Self::with_audio_port(DEFAULT_PORT)
    }

    pub fn with_audio_port(audio_port: u16) -> Self {
        Self {
            peers: RwLock::new(Vec::new()),
            observers: Observers::new(),
            audio_port,
        }
    }

    /// Record an announcement from `host`
    ///
    /// Returns true and notifies observers if the host was not known yet.
    /// A known host only has its `last_seen` refreshed.
    pub fn observe(&self, host: &str) -> bool {
        let endpoint = {
            let mut peers = self.peers.write();
            if let Some(entry) = peers.iter_mut().find(|e| e.endpoint.host() == host) {
                entry.last_seen = Utc::now();
                entry.refreshed_at = Instant::now();
                return false;
            }

            let now = Utc::now();
            let endpoint = PeerEndpoint::with_port(host, self.audio_port);
            peers.push(PeerEntry {
                endpoint: endpoint.clone(),
                first_seen: now,
                last_seen: now,
                refreshed_at: Instant::now(),
            });
            endpoint
        };

        tracing::info!("Discovered peer {}", endpoint.host());
        self.observers.notify(&PeerEvent::Discovered(endpoint));
        true
    }

    /// Drop peers not heard from within `ttl`, returning them in order
    pub fn expire_older_than(&self, ttl: Duration) -> Vec<PeerEndpoint> {
        let expired: Vec<PeerEndpoint> = {
            let mut peers = self.peers.write();
            let (stale, fresh): (Vec<_>, Vec<_>) = peers
                .drain(..)
                .partition(|e| e.refreshed_at.elapsed() > ttl);
            *peers = fresh;
            stale.into_iter().map(|e| e.endpoint).collect()
        };

        for endpoint in &expired {
            tracing::info!("Peer {} expired", endpoint.host());
            self.observers.notify(&PeerEvent::Expired(endpoint.clone()));
        }
        expired
    }

    /// Endpoints in discovery order
    pub fn peers(&self) -> Vec<PeerEndpoint> {
        self.peers.read().iter().map(|e| e.endpoint.clone()).collect()
    }

    pub fn entries(&self) -> Vec<PeerEntry> {
        self.peers.read().clone()
    }

    /// Look up a peer by host string
    pub fn get(&self, host: &str) -> Option<PeerEndpoint> {
        self.peers
            .read()
            .iter()
            .find(|e| e.endpoint.host() == host)
            .map(|e| e.endpoint.clone())
    }

    /// The known endpoint for `host`, or a new one on the audio port
    pub fn endpoint_for(&self, host: &str) -> PeerEndpoint {
        self.get(host)
            .unwrap_or_else(|| PeerEndpoint::with_port(host, self.audio_port))
    }

    pub fn contains(&self, host: &str) -> bool {
        self.get(host).is_some()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register an observer for registry changes
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&PeerEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback);
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn hosts(registry: &PeerRegistry) -> Vec<String> {
        registry.peers().iter().map(|p| p.host().to_string()).collect()
    }

    #[test]
    fn test_first_seen_order_without_duplicates() {
        let registry = PeerRegistry::new();
        assert!(registry.observe("10.0.0.5"));
        assert!(registry.observe("10.0.0.7"));
        assert!(!registry.observe("10.0.0.5"));

        assert_eq!(hosts(&registry), vec!["10.0.0.5", "10.0.0.7"]);
        assert_eq!(registry.get("10.0.0.7"), Some(PeerEndpoint::new("10.0.0.7")));
    }

    #[test]
    fn test_endpoint_for_unknown_host_uses_audio_port() {
        let registry = PeerRegistry::with_audio_port(7000);
        registry.observe("10.0.0.5");

        assert_eq!(registry.endpoint_for("10.0.0.5"), PeerEndpoint::with_port("10.0.0.5", 7000));
        assert_eq!(registry.endpoint_for("10.0.0.9").port(), 7000);
        assert!(!registry.contains("10.0.0.9"));
    }

    #[test]
    fn test_observers_see_only_new_peers() {
        let registry = PeerRegistry::with_audio_port(5000);
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            registry.subscribe(move |e| events.lock().push(e.clone()));
        }

        for host in ["a", "b", "a", "c", "b"] {
            registry.observe(host);
        }

        let expected: Vec<PeerEvent> = ["a", "b", "c"]
            .iter()
            .map(|h| PeerEvent::Discovered(PeerEndpoint::with_port(*h, 5000)))
            .collect();
        assert_eq!(*events.lock(), expected);
    }

    #[test]
    fn test_refresh_updates_last_seen() {
        let registry = PeerRegistry::new();
        registry.observe("10.0.0.5");
        let before = registry.entries()[0].clone();

        std::thread::sleep(Duration::from_millis(5));
        registry.observe("10.0.0.5");
        let after = registry.entries()[0].clone();

        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.last_seen > before.last_seen);
    }

    #[test]
    fn test_expiry_removes_stale_peers() {
        let registry = PeerRegistry::new();
        registry.observe("old");
        std::thread::sleep(Duration::from_millis(30));
        registry.observe("new");

        let expired = registry.expire_older_than(Duration::from_millis(20));
        assert_eq!(expired, vec![PeerEndpoint::new("old")]);
        assert_eq!(hosts(&registry), vec!["new"]);

        // A returning peer is appended as new
        assert!(registry.observe("old"));
        assert_eq!(hosts(&registry), vec!["new", "old"]);
    }
}
