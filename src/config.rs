//! Configuration file support
//!
//! Loads configuration from ~/.config/gust/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientDefaults,

    #[serde(default)]
    pub server: ServerDefaults,
}

/// Default settings for client mode
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientDefaults {
    /// Default transfer size (e.g., "100M", "1G")
    pub file_size: Option<String>,

    /// Parallel TCP transfers per test cycle
    pub tcp_connections: Option<usize>,

    /// Parallel UDP transfers per test cycle
    pub udp_connections: Option<usize>,

    /// Discovery port to listen on
    pub port: Option<u16>,

    /// Discovery timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Default to JSON output
    pub json_output: Option<bool>,

    /// Exit after the first test cycle
    pub once: Option<bool>,

    /// Log file path (e.g., "~/.config/gust/gust.log", null to disable)
    pub log_file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: Option<String>,
}

/// Default settings for server mode
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerDefaults {
    /// Discovery port to broadcast offers to
    pub port: Option<u16>,

    /// Seconds between offer broadcasts
    pub interval_secs: Option<u64>,

    /// Payload bytes per UDP segment
    pub udp_payload: Option<usize>,

    /// Write size for TCP transfers
    pub tcp_chunk: Option<usize>,

    /// Log file path (e.g., "~/.config/gust/gust.log", null to disable)
    pub log_file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from the default path.
    /// Returns default config if file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gust")
            .join("config.toml")
    }
}
