//! Audio datagram sender

use std::net::{SocketAddr, UdpSocket};

use crate::discovery::PeerEndpoint;
use crate::error::NetworkError;
use crate::network::udp::dial;

/// Connected UDP socket carrying one session's audio to one peer
pub struct AudioSender {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl AudioSender {
    /// Resolve `endpoint` and dial it
    pub fn connect(
        endpoint: &PeerEndpoint,
        send_buffer_size: Option<usize>,
    ) -> Result<Self, NetworkError> {
        let peer = endpoint.resolve().map_err(|e| NetworkError::DialFailed {
            addr: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let socket = dial(peer, send_buffer_size)?;
        Ok(Self { socket, peer })
    }

    /// Send one datagram; delivery is best effort
    pub fn send(&self, payload: &[u8]) -> Result<usize, NetworkError> {
        self.socket
            .send(payload)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Close the socket
    pub fn close(self) {
        tracing::debug!("Closing audio socket to {}", self.peer);
        drop(self.socket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_reaches_endpoint() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let sender = AudioSender::connect(&PeerEndpoint::with_port("127.0.0.1", port), None).unwrap();
        assert_eq!(sender.send(&[1, 2, 3, 4]).unwrap(), 4);
        assert_eq!(sender.peer_addr().port(), port);

        let mut buf = [0u8; 8];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);
        sender.close();
    }

    #[test]
    fn test_unresolvable_host_fails_dial() {
        let result = AudioSender::connect(&PeerEndpoint::new("no such host"), None);
        assert!(matches!(result, Err(NetworkError::DialFailed { .. })));
    }
}
