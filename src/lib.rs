//! # Delfos
//!
//! Live microphone streaming to a peer discovered on the local network.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            SENDER HOST                           │
//! │                                                                  │
//! │  Control surface (ui) ──start/stop/gain──► SessionController     │
//! │        ▲                                        │ one slot       │
//! │        │ peers                                  ▼                │
//! │  PeerRegistry ◄── PresenceListener     StreamingSession thread   │
//! │                        ▲               ┌─────────────────────┐   │
//! │                        │               │ Capture device      │   │
//! │  PresenceAnnouncer     │               │   → gain (saturate) │   │
//! │        │               │               │   → i16 LE encode   │   │
//! │        │               │               │   → UDP send        │   │
//! │        │               │               └──────────┬──────────┘   │
//! └────────┼───────────────┼──────────────────────────┼──────────────┘
//!          │ broadcast     │ broadcast                │ unicast
//!          ▼ :9999         │ :9999                    ▼ :9999
//!   "DELFOS_ONLINE:<ip>" ──┘ (from peers)        raw PCM datagrams
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod network;
pub mod observer;
pub mod session;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Discovery and audio port
    pub const DEFAULT_PORT: u16 = 9999;

    /// Default capture sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Interleaved samples per frame, one datagram each
    pub const DEFAULT_FRAME_LENGTH: usize = 512;

    /// Upper bound on one blocking capture read
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

    /// Chunks buffered between the device callback and the session loop
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    /// Interval between presence announcements
    pub const DEFAULT_ANNOUNCE_INTERVAL_MS: u64 = 2000;

    /// Largest discovery datagram read
    pub const MAX_DISCOVERY_DATAGRAM: usize = 1024;

    /// Default HTTP port for the control surface
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
