//! Error types for the streaming application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or missing selections, bad configuration files
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No capture device selected")]
    NoDevice,

    #[error("No destination peer selected")]
    NoPeer,

    #[error("Invalid gain: {0} (must be finite and non-negative)")]
    InvalidGain(f64),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Invalid frame length {frame_length} for {channels} channel(s)")]
    InvalidFrameLength { frame_length: usize, channels: u16 },

    #[error("Failed to read config file: {0}")]
    Load(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Capture device errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Failed to open stream: {0}")]
    OpenFailed(String),

    #[error("Failed to start stream: {0}")]
    StartFailed(String),

    #[error("Timed out waiting for audio")]
    ReadTimeout,

    #[error("Input overrun, {dropped} chunk(s) dropped")]
    Overrun { dropped: usize },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Failed to stop stream: {0}")]
    StopFailed(String),

    #[error("Failed to close stream: {0}")]
    CloseFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl DeviceError {
    /// Whether a running session can keep reading after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Disconnected)
    }
}

/// Network errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Socket bind on port {port} failed: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Failed to dial {addr}: {reason}")]
    DialFailed { addr: String, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Cannot resolve address: {0}")]
    AddressResolution(String),
}

/// Malformed wire data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("PCM payload has odd length {0}")]
    OddLength(usize),

    #[error("Datagram is not valid UTF-8")]
    NotUtf8,

    #[error("Datagram is not a presence announcement")]
    UnknownPrefix,

    #[error("Announcement carries no address")]
    EmptyAddress,
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("A streaming session is already active")]
    AlreadyActive,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_device_errors() {
        assert!(DeviceError::Disconnected.is_fatal());
        assert!(!DeviceError::ReadTimeout.is_fatal());
        assert!(!DeviceError::Overrun { dropped: 3 }.is_fatal());
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = SessionError::AlreadyActive.into();
        assert!(matches!(err, Error::Session(SessionError::AlreadyActive)));
        assert_eq!(
            err.to_string(),
            "Session error: A streaming session is already active"
        );
    }
}
