//! UDP socket construction

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

/// Public address used only to pick the outbound interface; nothing is sent
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

fn new_udp_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    Socket::new(Domain::for_address(*addr), Type::DGRAM, Some(Protocol::UDP))
}

fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Bind the discovery socket
///
/// Address reuse lets the port be rebound right after a restart; the
/// read timeout bounds how long the receive loop sleeps.
pub fn bind_discovery_socket(
    bind: SocketAddr,
    read_timeout: Duration,
) -> Result<UdpSocket, NetworkError> {
    let bind_failed = |e: std::io::Error| NetworkError::BindFailed {
        port: bind.port(),
        reason: e.to_string(),
    };

    let socket = new_udp_socket(&bind).map_err(bind_failed)?;
    socket.set_reuse_address(true).map_err(bind_failed)?;
    socket.set_broadcast(true).map_err(bind_failed)?;
    socket.bind(&SockAddr::from(bind)).map_err(bind_failed)?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(read_timeout))
        .map_err(bind_failed)?;
    Ok(socket)
}

/// Unbound-port socket allowed to send broadcasts
pub fn broadcast_socket() -> Result<UdpSocket, NetworkError> {
    let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    let bind_failed = |e: std::io::Error| NetworkError::BindFailed {
        port: 0,
        reason: e.to_string(),
    };

    let socket = new_udp_socket(&local).map_err(bind_failed)?;
    socket.set_broadcast(true).map_err(bind_failed)?;
    socket.bind(&SockAddr::from(local)).map_err(bind_failed)?;
    Ok(socket.into())
}

/// Create a UDP socket whose default destination is `peer`
///
/// UDP connect performs no handshake; it only fixes where `send` goes.
pub fn dial(peer: SocketAddr, send_buffer_size: Option<usize>) -> Result<UdpSocket, NetworkError> {
    let dial_failed = |e: std::io::Error| NetworkError::DialFailed {
        addr: peer.to_string(),
        reason: e.to_string(),
    };

    let socket = new_udp_socket(&peer).map_err(dial_failed)?;
    if let Some(size) = send_buffer_size {
        socket.set_send_buffer_size(size).map_err(dial_failed)?;
    }
    socket
        .bind(&SockAddr::from(unspecified_for(&peer)))
        .map_err(dial_failed)?;
    socket.connect(&SockAddr::from(peer)).map_err(dial_failed)?;
    Ok(socket.into())
}

/// The address other hosts on the LAN reach this host at
pub fn detect_local_address() -> Result<IpAddr, NetworkError> {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(ROUTE_PROBE_ADDR)?;
        Ok(socket.local_addr()?.ip())
    };
    probe().map_err(|e| NetworkError::AddressResolution(format!("local address: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_sends_to_peer() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let socket = dial(receiver.local_addr().unwrap(), Some(64 * 1024)).unwrap();
        socket.send(b"ping").unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from.port(), socket.local_addr().unwrap().port());
    }

    #[test]
    fn test_discovery_socket_has_timeout() {
        let socket =
            bind_discovery_socket("127.0.0.1:0".parse().unwrap(), Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 8];
        let err = socket.recv_from(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }
}
