//! Network subsystem for UDP audio transport

pub mod udp;
pub mod sender;

pub use udp::{bind_discovery_socket, broadcast_socket, detect_local_address, dial};
pub use sender::AudioSender;
