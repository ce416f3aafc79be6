//! Broker error types

use thiserror::Error;

/// Errors that can occur while talking to a broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Address {addr} is already in use: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker at {addr} closed the connection")]
    Disconnected { addr: String },

    #[error("Broker at {addr} did not answer within {timeout_ms}ms")]
    Unresponsive { addr: String, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker error: {0}")]
    Remote(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    /// Check if this error means the address could not be taken
    pub fn is_bind(&self) -> bool {
        matches!(self, BrokerError::Bind { .. })
    }

    /// Check if this error means the broker could not be reached or dropped us
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            BrokerError::Unreachable { .. }
                | BrokerError::Disconnected { .. }
                | BrokerError::Unresponsive { .. }
                | BrokerError::Io(_)
        )
    }
}
