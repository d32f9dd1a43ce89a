//! Capture device enumeration and the backend seam
//!
//! The session only talks to [`CaptureBackend`] and [`CaptureStream`];
//! cpal and the simulated device both sit behind them.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::error::DeviceError;

/// Prefix used for cpal input device identifiers
pub const INPUT_ID_PREFIX: &str = "input:";

/// Description of a capture device, as reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub max_input_channels: u16,
    #[serde(rename = "default_input_latency_ms", serialize_with = "latency_ms")]
    pub default_input_latency: Option<Duration>,
    pub is_default: bool,
}

fn latency_ms<S: Serializer>(latency: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match latency {
        Some(d) => s.serialize_some(&(d.as_micros() as f64 / 1000.0)),
        None => s.serialize_none(),
    }
}

/// Geometry of a capture stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples per frame
    pub frame_length: usize,
    /// Upper bound for one blocking read
    pub read_timeout: Duration,
}

impl StreamParams {
    /// Sample frames per channel in one buffer
    pub fn frames_per_buffer(&self) -> usize {
        self.frame_length / self.channels.max(1) as usize
    }

    /// Real-time duration of one frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer() as f64 / self.sample_rate.max(1) as f64)
    }
}

/// An opened capture stream yielding fixed-size i16 frames
pub trait CaptureStream: Send {
    /// Begin delivering audio
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Block until `frame` is filled with the next captured samples
    fn read_into(&mut self, frame: &mut [i16]) -> Result<(), DeviceError>;

    /// Pause delivery; the stream can no longer be read from afterwards
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Release the device
    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}

/// Source of capture devices
pub trait CaptureBackend: Send + Sync {
    /// List devices with at least one input channel
    fn list_input_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError>;

    /// Open a stream on `device`; the stream is not started yet
    fn open_stream(
        &self,
        device: &DeviceDescriptor,
        params: &StreamParams,
    ) -> Result<Box<dyn CaptureStream>, DeviceError>;

    /// Look up a device by id
    fn find_device(&self, id: &str) -> Result<DeviceDescriptor, DeviceError> {
        self.list_input_devices()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))
    }
}

/// List all cpal input devices on the default host
pub fn list_cpal_input_devices() -> Result<Vec<DeviceDescriptor>, DeviceError> {
    let host = cpal::default_host();
    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());

    let input_devices = host
        .input_devices()
        .map_err(|e| DeviceError::NotFound(e.to_string()))?;

    let mut devices = Vec::new();
    for device in input_devices {
        let Ok(name) = device.name() else { continue };

        let max_input_channels = max_input_channels(&device);
        if max_input_channels == 0 {
            continue;
        }

        devices.push(DeviceDescriptor {
            id: format!("{}{}", INPUT_ID_PREFIX, name),
            is_default: default_input_name.as_ref() == Some(&name),
            name,
            max_input_channels,
            default_input_latency: default_input_latency(&device),
        });
    }

    Ok(devices)
}

fn max_input_channels(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Smallest buffer the device accepts at its default rate, as a duration
fn default_input_latency(device: &cpal::Device) -> Option<Duration> {
    let config = device.default_input_config().ok()?;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, .. } if config.sample_rate().0 > 0 => Some(
            Duration::from_secs_f64(*min as f64 / config.sample_rate().0 as f64),
        ),
        _ => None,
    }
}

/// Get a cpal input device by its ID
pub fn get_cpal_input_device(id: &str) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();

    // Bare names are accepted as well as prefixed ids
    let name = id.strip_prefix(INPUT_ID_PREFIX).unwrap_or(id);

    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::NotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(DeviceError::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_params_geometry() {
        let params = StreamParams {
            sample_rate: 44100,
            channels: 2,
            frame_length: 512,
            read_timeout: Duration::from_millis(500),
        };
        assert_eq!(params.frames_per_buffer(), 256);
        let micros = params.frame_duration().as_micros();
        assert!((5804..=5805).contains(&micros));
    }

    #[test]
    fn test_descriptor_serializes_latency_in_ms() {
        let device = DeviceDescriptor {
            id: "input:Mic".into(),
            name: "Mic".into(),
            max_input_channels: 2,
            default_input_latency: Some(Duration::from_millis(10)),
            is_default: true,
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["default_input_latency_ms"], 10.0);
        assert_eq!(json["max_input_channels"], 2);
    }
}
