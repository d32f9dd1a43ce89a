//! PCM wire decoder

use bytes::Buf;

use crate::error::FormatError;

/// Decode a little-endian PCM payload back into samples
///
/// Odd-length payloads are rejected rather than truncated.
pub fn decode_frame(mut payload: &[u8]) -> Result<Vec<i16>, FormatError> {
    if payload.len() % 2 != 0 {
        return Err(FormatError::OddLength(payload.len()));
    }

    let mut frame = Vec::with_capacity(payload.len() / 2);
    while payload.has_remaining() {
        frame.push(payload.get_i16_le());
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_bytes() {
        let frame = decode_frame(&[0x02, 0x01, 0x00, 0x80]).unwrap();
        assert_eq!(frame, vec![0x0102, i16::MIN]);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(decode_frame(&[1, 2, 3]), Err(FormatError::OddLength(3)));
        assert_eq!(decode_frame(&[1]), Err(FormatError::OddLength(1)));
        assert_eq!(decode_frame(&[]), Ok(vec![]));
    }

    proptest! {
        #[test]
        fn round_trip(frame in proptest::collection::vec(any::<i16>(), 0..1024)) {
            let payload = encode_frame(&frame);
            prop_assert_eq!(payload.len(), frame.len() * 2);
            prop_assert_eq!(decode_frame(&payload).unwrap(), frame);
        }
    }
}
