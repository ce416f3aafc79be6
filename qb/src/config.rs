//! Configuration for queuebroker

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ClientOptions, ServerOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to listen on / connect to
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Largest accepted wire frame in bytes
    #[serde(rename = "max-frame-bytes")]
    pub max_frame_bytes: usize,

    /// Client connect timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Client reply timeout for non-blocking commands in milliseconds
    #[serde(rename = "io-timeout-ms")]
    pub io_timeout_ms: u64,

    /// Longest broker silence a client tolerates in milliseconds
    #[serde(rename = "idle-timeout-ms")]
    pub idle_timeout_ms: u64,

    /// Server heartbeat interval for waiting pops in milliseconds
    #[serde(rename = "heartbeat-interval-ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_PORT,
            max_frame_bytes: crate::DEFAULT_MAX_FRAME_BYTES,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 5_000,
            idle_timeout_ms: 15_000,
            heartbeat_interval_ms: 5_000,
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(config_path)
                .context(format!("Failed to load config from {}", config_path.display()));
        }

        // Try default locations
        let default_paths = [
            Some(PathBuf::from(".queuebroker.yml")),
            dirs::config_dir().map(|p| p.join("queuebroker").join("queuebroker.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// `host:port` of the broker
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            max_frame_bytes: self.max_frame_bytes,
            heartbeat_interval: std::time::Duration::from_millis(self.heartbeat_interval_ms),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: std::time::Duration::from_millis(self.connect_timeout_ms),
            io_timeout: std::time::Duration::from_millis(self.io_timeout_ms),
            max_frame_bytes: self.max_frame_bytes,
            idle_timeout: std::time::Duration::from_millis(self.idle_timeout_ms),
        }
    }
}
