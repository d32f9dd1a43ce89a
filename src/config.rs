//! Application configuration
//!
//! Read from a TOML file; every section and field falls back to its
//! default when missing.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::discovery::{AnnouncerConfig, ListenerConfig};
use crate::error::ConfigError;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "DELFOS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub discovery: DiscoveryConfig,
    pub network: NetworkConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples per frame and per datagram
    pub frame_length: usize,
    pub default_gain: f64,
    /// Range offered by the control surface
    pub min_gain: f64,
    pub max_gain: f64,
    pub gain_step: f64,
    pub read_timeout_ms: u64,
    /// Device callback chunks buffered ahead of the session loop
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_length: DEFAULT_FRAME_LENGTH,
            default_gain: 1.0,
            min_gain: 1.0,
            max_gain: 12.0,
            gain_step: 0.1,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub bind_address: IpAddr,
    pub announce_interval_ms: u64,
    pub broadcast_address: IpAddr,
    /// Address to announce; detected from the default route when unset
    pub advertise_address: Option<String>,
    /// Forget silent peers after this many seconds; unset keeps them
    pub peer_ttl_secs: Option<u64>,
    /// Skip announcements carrying our own address
    pub ignore_self: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            announce_interval_ms: DEFAULT_ANNOUNCE_INTERVAL_MS,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            advertise_address: None,
            peer_ttl_secs: None,
            ignore_self: true,
        }
    }
}

impl DiscoveryConfig {
    /// Listener settings, ignoring `own_address` if configured to
    pub fn listener(&self, own_address: Option<&str>) -> ListenerConfig {
        ListenerConfig {
            bind_address: self.bind_address,
            port: self.port,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            peer_ttl: self.peer_ttl_secs.map(Duration::from_secs),
            ignored_addresses: match own_address {
                Some(address) if self.ignore_self => vec![address.to_string()],
                _ => Vec::new(),
            },
        }
    }

    pub fn announcer(&self, advertise_address: &str) -> AnnouncerConfig {
        AnnouncerConfig {
            target: SocketAddr::new(self.broadcast_address, self.port),
            interval: Duration::from_millis(self.announce_interval_ms),
            advertise_address: advertise_address.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port audio is sent to on the peer
    pub audio_port: u16,
    pub send_buffer_size: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            audio_port: DEFAULT_PORT,
            send_buffer_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: IpAddr,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load from `$DELFOS_CONFIG` or the per-user config directory
    ///
    /// A missing file yields the defaults; an unreadable or invalid one
    /// is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("", "", "delfos").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write the config as TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Load(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.discovery.port, 9999);
        assert_eq!(config.audio.frame_length, 512);
        assert_eq!(config.audio.sample_rate, 44100);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [audio]
            default_gain = 2.5

            [discovery]
            peer_ttl_secs = 30
            advertise_address = "192.168.1.20"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.default_gain, 2.5);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.discovery.peer_ttl_secs, Some(30));
        assert_eq!(config.ui, UiConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml("[audio]\nsample_rate = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_listener_ignores_own_address() {
        let discovery = DiscoveryConfig::default();
        assert_eq!(discovery.listener(Some("10.0.0.2")).ignored_addresses, vec!["10.0.0.2"]);

        let permissive = DiscoveryConfig {
            ignore_self: false,
            ..Default::default()
        };
        assert!(permissive.listener(Some("10.0.0.2")).ignored_addresses.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("delfos-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.ui.http_port = 9090;
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
        let _ = std::fs::remove_dir_all(dir);
    }
}
