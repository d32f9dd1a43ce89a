//! PCM wire encoder
//!
//! Serializes interleaved i16 frames as little-endian bytes, two bytes
//! per sample, with no header.

use bytes::{BufMut, Bytes, BytesMut};

/// Encode a frame into a freshly allocated payload
pub fn encode_frame(frame: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.len() * 2);
    write_samples(&mut buf, frame);
    buf.freeze()
}

fn write_samples(buf: &mut BytesMut, frame: &[i16]) {
    for &sample in frame {
        buf.put_i16_le(sample);
    }
}

/// Frame encoder with a reusable output buffer
pub struct PcmEncoder {
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: BytesMut,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    /// Create an encoder sized for frames of `frame_length` samples
    pub fn new(frame_length: usize) -> Self {
        Self {
            encode_buffer: BytesMut::with_capacity(frame_length * 2),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a frame, returning a view into the internal buffer
    ///
    /// The slice is valid until the next call.
    pub fn encode(&mut self, frame: &[i16]) -> &[u8] {
        self.encode_buffer.clear();
        write_samples(&mut self.encode_buffer, frame);

        self.frames_encoded += 1;
        self.bytes_produced += self.encode_buffer.len() as u64;

        &self.encode_buffer[..]
    }

    /// Get encoder statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let payload = encode_frame(&[0x0102, -2, i16::MIN, i16::MAX]);
        assert_eq!(
            &payload[..],
            &[0x02, 0x01, 0xFE, 0xFF, 0x00, 0x80, 0xFF, 0x7F]
        );
    }

    #[test]
    fn test_length_is_twice_frame() {
        let frame = vec![7i16; 512];
        assert_eq!(encode_frame(&frame).len(), 1024);
        assert!(encode_frame(&[]).is_empty());
    }

    #[test]
    fn test_encoder_reuses_buffer() {
        let mut encoder = PcmEncoder::new(4);

        assert_eq!(encoder.encode(&[1, 2, 3, 4]), &[1, 0, 2, 0, 3, 0, 4, 0]);
        assert_eq!(encoder.encode(&[-1]), &[0xFF, 0xFF]);

        let stats = encoder.stats();
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.bytes_produced, 10);
    }
}
