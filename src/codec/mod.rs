//! Wire codec for raw PCM datagrams
//!
//! An audio datagram is the frame's samples as i16 little-endian,
//! `2 * N` bytes for N interleaved samples.

pub mod encoder;
pub mod decoder;

pub use encoder::{encode_frame, PcmEncoder};
pub use decoder::decode_frame;
