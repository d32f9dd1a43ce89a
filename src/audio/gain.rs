//! Saturating gain for i16 PCM frames

use crossbeam::atomic::AtomicCell;
use std::sync::Arc;

use crate::error::ConfigError;

/// Scale one sample, clamping to the i16 range instead of wrapping
#[inline]
pub fn scale_sample(sample: i16, gain: f64) -> i16 {
    let value = f64::from(sample) * gain;
    value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Apply gain to a frame in place
pub fn apply_gain_in_place(frame: &mut [i16], gain: f64) {
    if gain == 1.0 {
        return;
    }
    for sample in frame.iter_mut() {
        *sample = scale_sample(*sample, gain);
    }
}

/// Apply gain, returning a new frame of equal length
pub fn apply_gain(frame: &[i16], gain: f64) -> Vec<i16> {
    frame.iter().map(|&s| scale_sample(s, gain)).collect()
}

fn validate(gain: f64) -> Result<f64, ConfigError> {
    if gain.is_finite() && gain >= 0.0 {
        Ok(gain)
    } else {
        Err(ConfigError::InvalidGain(gain))
    }
}

/// Gain value shared between the control side and a running capture loop
///
/// Written by setters, read once per frame by the loop. A reader may see
/// the previous value for one frame.
#[derive(Clone, Debug)]
pub struct SharedGain {
    value: Arc<AtomicCell<f64>>,
}

impl SharedGain {
    pub fn new(gain: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            value: Arc::new(AtomicCell::new(validate(gain)?)),
        })
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }

    pub fn set(&self, gain: f64) -> Result<(), ConfigError> {
        self.value.store(validate(gain)?);
        Ok(())
    }
}

impl Default for SharedGain {
    fn default() -> Self {
        Self {
            value: Arc::new(AtomicCell::new(1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_saturation() {
        assert_eq!(scale_sample(20000, 2.0), i16::MAX);
        assert_eq!(scale_sample(-20000, 2.0), i16::MIN);
        assert_eq!(scale_sample(1000, 2.5), 2500);
    }

    #[test]
    fn test_zero_gain_silences() {
        let frame = apply_gain(&[i16::MIN, -1, 0, 1, i16::MAX], 0.0);
        assert!(frame.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_in_place_matches_copy() {
        let source = vec![100, -2000, 30000, -32768, 7];
        let mut frame = source.clone();
        apply_gain_in_place(&mut frame, 3.3);
        assert_eq!(frame, apply_gain(&source, 3.3));
    }

    #[test]
    fn test_shared_gain_rejects_invalid() {
        assert_eq!(SharedGain::new(-1.0).unwrap_err(), ConfigError::InvalidGain(-1.0));
        assert!(SharedGain::new(f64::NAN).is_err());

        let gain = SharedGain::new(1.5).unwrap();
        assert!(gain.set(f64::INFINITY).is_err());
        assert_eq!(gain.get(), 1.5);

        let reader = gain.clone();
        gain.set(4.0).unwrap();
        assert_eq!(reader.get(), 4.0);
    }

    proptest! {
        #[test]
        fn unity_gain_is_identity(sample in any::<i16>()) {
            prop_assert_eq!(scale_sample(sample, 1.0), sample);
        }

        #[test]
        fn output_stays_in_range(sample in any::<i16>(), gain in 0.0f64..1000.0) {
            let out = scale_sample(sample, gain) as i32;
            prop_assert!((i16::MIN as i32..=i16::MAX as i32).contains(&out));
            // saturation never flips the sign
            prop_assert!(out == 0 || (out > 0) == (sample > 0));
        }
    }
}
