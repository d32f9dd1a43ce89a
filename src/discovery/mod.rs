//! Peer discovery over UDP broadcast
//!
//! Every host periodically broadcasts `DELFOS_ONLINE:<address>` on the
//! discovery port. Listeners collect the addresses they hear into a
//! [`PeerRegistry`], which is what the user picks a destination from.

pub mod announcer;
pub mod listener;
pub mod registry;

pub use announcer::{AnnouncerConfig, PresenceAnnouncer};
pub use listener::{ListenerConfig, PresenceListener};
pub use registry::{PeerEntry, PeerEvent, PeerRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::constants::DEFAULT_PORT;
use crate::error::{FormatError, NetworkError};

/// Prefix of every presence announcement
pub const ANNOUNCE_PREFIX: &str = "DELFOS_ONLINE:";

/// Build the announcement text for `address`
pub fn format_announcement(address: &str) -> String {
    format!("{}{}", ANNOUNCE_PREFIX, address)
}

/// Extract the announced address from a datagram
pub fn parse_announcement(payload: &[u8]) -> Result<&str, FormatError> {
    let text = std::str::from_utf8(payload).map_err(|_| FormatError::NotUtf8)?;
    let address = text
        .strip_prefix(ANNOUNCE_PREFIX)
        .ok_or(FormatError::UnknownPrefix)?
        .trim_matches(|c: char| c.is_whitespace() || c == '\0');

    if address.is_empty() {
        return Err(FormatError::EmptyAddress);
    }
    Ok(address)
}

/// Address of a peer that can receive audio
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEndpoint {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl PeerEndpoint {
    /// Peer on the default audio port
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_PORT)
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to the first matching socket address
    pub fn resolve(&self) -> Result<SocketAddr, NetworkError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::AddressResolution(format!("{}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| NetworkError::AddressResolution(self.host.clone()))
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        assert_eq!(parse_announcement(b"DELFOS_ONLINE:192.168.1.10"), Ok("192.168.1.10"));
        assert_eq!(parse_announcement(b"DELFOS_ONLINE:10.0.0.5\n"), Ok("10.0.0.5"));
    }

    #[test]
    fn test_parse_rejects_other_datagrams() {
        assert_eq!(parse_announcement(b"HELLO:x"), Err(FormatError::UnknownPrefix));
        assert_eq!(parse_announcement(b"DELFOS_ONLINE:"), Err(FormatError::EmptyAddress));
        assert_eq!(parse_announcement(&[0xFF, 0xFE, 0x00, 0x80]), Err(FormatError::NotUtf8));
    }

    #[test]
    fn test_format_round_trips() {
        let text = format_announcement("10.1.2.3");
        assert_eq!(text, "DELFOS_ONLINE:10.1.2.3");
        assert_eq!(parse_announcement(text.as_bytes()), Ok("10.1.2.3"));
    }

    #[test]
    fn test_endpoint_display_and_resolve() {
        assert_eq!(PeerEndpoint::new("10.0.0.7").to_string(), "10.0.0.7:9999");
        assert_eq!(PeerEndpoint::with_port("::1", 5000).to_string(), "[::1]:5000");

        let addr = PeerEndpoint::with_port("127.0.0.1", 4321).resolve().unwrap();
        assert_eq!(addr, "127.0.0.1:4321".parse().unwrap());
    }
}
