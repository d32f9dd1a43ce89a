//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod gain;
pub mod simulated;

pub use capture::CpalBackend;
pub use device::{CaptureBackend, CaptureStream, DeviceDescriptor, StreamParams};
pub use gain::{apply_gain, apply_gain_in_place, SharedGain};
pub use simulated::SimulatedBackend;
