//! Transport error types

use queuebroker::BrokerError;
use thiserror::Error;

use crate::envelope::RequestId;
use crate::serializer::SerializerError;
use crate::transport::TransportState;

/// Errors that can occur during transport operations
///
/// Running out of time on a receive is not an error; see
/// [`Received::Timeout`](crate::Received::Timeout).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind broker at {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: BrokerError,
    },

    #[error("Connection error: {0}")]
    Connection(#[source] BrokerError),

    #[error("Failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: SerializerError,
    },

    #[error("Failed to deserialize {what} from queue {queue}: {source}")]
    Deserialization {
        what: &'static str,
        queue: String,
        #[source]
        source: SerializerError,
    },

    #[error("Response for request {actual} arrived on the queue of request {expected}")]
    Correlation { expected: RequestId, actual: RequestId },

    #[error("Cannot {operation} while transport is {state}")]
    InvalidState {
        operation: &'static str,
        state: TransportState,
    },
}

/// Broker failures become `Bind` or `Connection`, except an envelope too big
/// for the wire, which is a `Serialization` problem of the payload
impl From<BrokerError> for TransportError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Bind { addr, source } => TransportError::Bind {
                addr: addr.clone(),
                source: BrokerError::Bind { addr, source },
            },
            BrokerError::FrameTooLarge { .. } => TransportError::Serialization {
                what: "frame",
                source: SerializerError::Encode {
                    codec: "wire",
                    source: Box::new(err),
                },
            },
            other => TransportError::Connection(other),
        }
    }
}

impl TransportError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, TransportError::Bind { .. })
    }

    /// Check if the operation was refused because the transport is closed
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidState {
                state: TransportState::Closed,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_from_broker() {
        let err: TransportError = BrokerError::Bind {
            addr: "127.0.0.1:7700".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        }
        .into();
        assert!(err.is_bind());
        assert!(err.to_string().contains("127.0.0.1:7700"));
    }

    #[test]
    fn test_other_broker_errors_are_connection_errors() {
        let err: TransportError = BrokerError::Disconnected {
            addr: "127.0.0.1:7700".to_string(),
        }
        .into();
        assert!(err.is_connection());

        let err: TransportError = BrokerError::Remote("boom".to_string()).into();
        assert!(err.is_connection());
    }

    #[test]
    fn test_oversized_frame_is_serialization_error() {
        let err: TransportError = BrokerError::FrameTooLarge { size: 100, limit: 64 }.into();
        assert!(matches!(err, TransportError::Serialization { what: "frame", .. }));
        assert!(!err.is_connection());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TransportError::InvalidState {
            operation: "send_request",
            state: TransportState::Closed,
        };
        assert_eq!(err.to_string(), "Cannot send_request while transport is closed");
        assert!(err.is_closed());
    }

    #[test]
    fn test_correlation_message() {
        let err = TransportError::Correlation {
            expected: RequestId::new("a"),
            actual: RequestId::new("b"),
        };
        let msg = err.to_string();
        assert!(msg.contains("request b"));
        assert!(msg.contains("request a"));
    }
}
