//! Envelope serializers
//!
//! The transport only moves bytes; a [`Serializer`] turns envelopes into bytes
//! and back. Both ends of a transport must agree on the same one.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from encoding or decoding a value
#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("{codec} encoding failed: {source}")]
    Encode {
        codec: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{codec} decoding failed: {source}")]
    Decode {
        codec: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Converts values to and from an opaque byte representation
///
/// Implementations are pure: the same value always encodes to bytes that
/// decode back to an equal value, and nothing else happens along the way.
pub trait Serializer: Send + Sync + Clone + 'static {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializerError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError>;
}

/// JSON encoding (serde_json)
///
/// Self-describing, so it handles `serde_json::Value` payloads. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        serde_json::to_vec(value).map_err(|e| SerializerError::Encode {
            codec: self.name(),
            source: e.into(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        serde_json::from_slice(bytes).map_err(|e| SerializerError::Decode {
            codec: self.name(),
            source: e.into(),
        })
    }
}

/// Compact binary encoding (bincode)
///
/// Only for typed payloads: bincode is not self-describing and cannot decode
/// `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        bincode::serialize(value).map_err(|e| SerializerError::Encode {
            codec: self.name(),
            source: e.into(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        bincode::deserialize(bytes).map_err(|e| SerializerError::Decode {
            codec: self.name(),
            source: e.into(),
        })
    }
}
