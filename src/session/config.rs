use std::time::Duration;

use crate::audio::{DeviceDescriptor, SharedGain, StreamParams};
use crate::config::{AudioConfig, NetworkConfig};
use crate::constants::{DEFAULT_CHANNELS, DEFAULT_FRAME_LENGTH, DEFAULT_READ_TIMEOUT_MS, DEFAULT_SAMPLE_RATE};
use crate::discovery::PeerEndpoint;
use crate::error::ConfigError;

/// Everything a session needs, fixed at start except for the gain
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device: Option<DeviceDescriptor>,
    pub peer: PeerEndpoint,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples per frame
    pub frame_length: usize,
    pub read_timeout: Duration,
    pub send_buffer_size: Option<usize>,
    /// Read fresh by the capture loop every frame
    pub gain: SharedGain,
}

impl SessionConfig {
    pub fn new(device: Option<DeviceDescriptor>, peer: PeerEndpoint, gain: SharedGain) -> Self {
        Self {
            device,
            peer,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_length: DEFAULT_FRAME_LENGTH,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            send_buffer_size: None,
            gain,
        }
    }

    /// Take stream geometry and socket options from the app config
    pub fn with_settings(mut self, audio: &AudioConfig, network: &NetworkConfig) -> Self {
        self.sample_rate = audio.sample_rate;
        self.channels = audio.channels;
        self.frame_length = audio.frame_length;
        self.read_timeout = Duration::from_millis(audio.read_timeout_ms);
        self.send_buffer_size = network.send_buffer_size;
        self
    }

    /// Check the selections and derive the stream parameters
    pub fn validate(&self) -> Result<(&DeviceDescriptor, StreamParams), ConfigError> {
        let device = self.device.as_ref().ok_or(ConfigError::NoDevice)?;
        if self.peer.host().trim().is_empty() {
            return Err(ConfigError::NoPeer);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0
            || self.frame_length == 0
            || self.frame_length % self.channels as usize != 0
        {
            return Err(ConfigError::InvalidFrameLength {
                frame_length: self.frame_length,
                channels: self.channels,
            });
        }

        Ok((
            device,
            StreamParams {
                sample_rate: self.sample_rate,
                channels: self.channels,
                frame_length: self.frame_length,
                read_timeout: self.read_timeout,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SimulatedBackend;

    fn config() -> SessionConfig {
        let device = SimulatedBackend::scripted(vec![]).device();
        SessionConfig::new(Some(device), PeerEndpoint::new("10.0.0.5"), SharedGain::default())
    }

    #[test]
    fn test_valid_defaults() {
        let config = config();
        let (device, params) = config.validate().unwrap();
        assert_eq!(device.id, "sim:0");
        assert_eq!(params.frame_length, 512);
        assert_eq!(params.frames_per_buffer(), 256);
    }

    #[test]
    fn test_missing_selections() {
        let mut missing_device = config();
        missing_device.device = None;
        assert_eq!(missing_device.validate().unwrap_err(), ConfigError::NoDevice);

        let mut missing_peer = config();
        missing_peer.peer = PeerEndpoint::new("");
        assert_eq!(missing_peer.validate().unwrap_err(), ConfigError::NoPeer);
    }

    #[test]
    fn test_frame_must_hold_whole_sample_frames() {
        let mut odd = config();
        odd.frame_length = 511;
        assert_eq!(
            odd.validate().unwrap_err(),
            ConfigError::InvalidFrameLength { frame_length: 511, channels: 2 }
        );
    }
}
