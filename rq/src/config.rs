//! QueueRPC configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use queuebroker::{ClientOptions, ServerOptions};

use crate::transport::QueueNames;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Transport behavior
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: queuebroker::DEFAULT_PORT,
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .queuerpc.yml
        let local_config = PathBuf::from(".queuerpc.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/queuerpc/queuerpc.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("queuerpc").join("queuerpc.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// What happens to a reply queue once its response has been read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCleanup {
    /// Delete the queue, dropping any duplicate replies with it
    #[default]
    Delete,

    /// Leave the queue to the broker
    Leave,
}

/// Transport behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Name of the shared request queue
    #[serde(rename = "requests-queue")]
    pub requests_queue: String,

    /// Prefix of per-request reply queues
    #[serde(rename = "response-prefix")]
    pub response_prefix: String,

    /// Reply queue handling after a response is consumed
    pub cleanup: ResponseCleanup,

    /// How long a caller waits for a response; absent means forever
    #[serde(rename = "response-timeout-ms")]
    pub response_timeout_ms: Option<u64>,

    /// How often a worker wakes up to check for shutdown
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Broker connect timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Broker reply timeout for non-blocking commands in milliseconds
    #[serde(rename = "io-timeout-ms")]
    pub io_timeout_ms: u64,

    /// Longest broker silence tolerated while waiting, in milliseconds
    #[serde(rename = "idle-timeout-ms")]
    pub idle_timeout_ms: u64,

    /// Heartbeat interval of an embedded broker, in milliseconds
    #[serde(rename = "heartbeat-interval-ms")]
    pub heartbeat_interval_ms: u64,

    /// Largest wire frame in bytes
    #[serde(rename = "max-frame-bytes")]
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let names = QueueNames::default();
        Self {
            requests_queue: names.requests,
            response_prefix: names.response_prefix,
            cleanup: ResponseCleanup::Delete,
            response_timeout_ms: Some(300_000),
            poll_interval_ms: 1_000,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 5_000,
            idle_timeout_ms: 15_000,
            heartbeat_interval_ms: 5_000,
            max_frame_bytes: queuebroker::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl TransportConfig {
    pub fn queue_names(&self) -> QueueNames {
        QueueNames::new(&self.requests_queue, &self.response_prefix)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_frame_bytes: self.max_frame_bytes,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            max_frame_bytes: self.max_frame_bytes,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}
