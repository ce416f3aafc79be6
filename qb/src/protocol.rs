//! Broker wire protocol
//!
//! Simple JSON-over-newline protocol. Each frame is a single line of JSON
//! followed by `\n`. A client sends a [`BrokerCommand`] and reads back exactly
//! one [`BrokerReply`], preceded by any number of [`BrokerReply::Waiting`]
//! heartbeats while a pop is parked. Payloads travel as base64 strings.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::BrokerError;

/// Commands from a client to the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BrokerCommand {
    /// Append a payload to a queue
    Push {
        queue: String,
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
    },

    /// Take the head of a queue, waiting up to `timeout_ms` (forever if absent)
    Pop {
        queue: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Drop a queue and its contents
    Delete { queue: String },

    /// Count the payloads in a queue
    Len { queue: String },

    /// Check that the broker is alive
    Ping,
}

/// Replies from the broker to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BrokerReply {
    /// Acknowledgment
    Ok,

    /// Popped payload
    Item {
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
    },

    /// Heartbeat sent while a pop is still waiting
    Waiting,

    /// Pop deadline passed with nothing to return
    Timeout,

    /// Result of a delete
    Deleted { existed: bool },

    /// Queue length
    Len { len: usize },

    /// Pong response to ping
    Pong,

    /// Error response
    Error { message: String },
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Read one frame, returning `None` on a clean end of stream
///
/// Never buffers more than `limit + 1` bytes, newline or not.
pub async fn read_frame<R, T>(reader: &mut R, limit: usize) -> Result<Option<T>, BrokerError>
where
    R: AsyncBufRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = Vec::new();
    let bytes_read = (&mut *reader).take(cap).read_until(b'\n', &mut line).await?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if bytes_read > limit {
        return Err(BrokerError::FrameTooLarge {
            size: bytes_read,
            limit,
        });
    }

    if line.last() != Some(&b'\n') {
        return Err(BrokerError::Protocol("Truncated frame".to_string()));
    }

    let frame = serde_json::from_slice(&line)
        .map_err(|e| BrokerError::Protocol(format!("Failed to parse frame: {}", e)))?;
    Ok(Some(frame))
}

/// Write one frame and flush it
pub async fn write_frame<W, T>(writer: &mut W, frame: &T, limit: usize) -> Result<(), BrokerError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');

    if bytes.len() > limit {
        return Err(BrokerError::FrameTooLarge {
            size: bytes.len(),
            limit,
        });
    }

    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_push_serialize() {
        let cmd = BrokerCommand::Push {
            queue: "requests".to_string(),
            payload: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"Push","queue":"requests","payload":"AQID"}"#);
    }

    #[test]
    fn test_pop_without_timeout_serialize() {
        let cmd = BrokerCommand::Pop {
            queue: "requests".to_string(),
            timeout_ms: None,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"Pop","queue":"requests"}"#);
    }

    #[test]
    fn test_pop_with_timeout_deserialize() {
        let json = r#"{"type":"Pop","queue":"response:abc","timeout_ms":250}"#;
        let cmd: BrokerCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            BrokerCommand::Pop {
                queue: "response:abc".to_string(),
                timeout_ms: Some(250)
            }
        );
    }

    #[test]
    fn test_ping_serialize() {
        let json = serde_json::to_string(&BrokerCommand::Ping).unwrap();
        assert_eq!(json, r#"{"type":"Ping"}"#);
    }

    #[test]
    fn test_timeout_reply_serialize() {
        let json = serde_json::to_string(&BrokerReply::Timeout).unwrap();
        assert_eq!(json, r#"{"type":"Timeout"}"#);
    }

    #[test]
    fn test_error_reply_serialize() {
        let reply = BrokerReply::Error {
            message: "Something went wrong".to_string(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"type":"Error","message":"Something went wrong"}"#);
    }

    #[tokio::test]
    async fn test_read_frame_end_of_stream() {
        let mut reader = BufReader::new(&b""[..]);
        let frame: Option<BrokerCommand> = read_frame(&mut reader, 1024).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized() {
        let line = format!("{}\n", serde_json::to_string(&BrokerCommand::Ping).unwrap());
        let mut reader = BufReader::new(line.as_bytes());
        let result: Result<Option<BrokerCommand>, _> = read_frame(&mut reader, 4).await;
        assert!(matches!(result, Err(BrokerError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_item_payload_round_trip() {
        let reply = BrokerReply::Item {
            payload: vec![0, 255, b'\n', 7],
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"type":"Item","payload":"AP8KBw=="}"#);
        assert_eq!(serde_json::from_str::<BrokerReply>(&json).unwrap(), reply);
    }

    #[test]
    fn test_invalid_base64_payload_rejected() {
        let json = r#"{"type":"Push","queue":"q","payload":"not base64!"}"#;
        assert!(serde_json::from_str::<BrokerCommand>(json).is_err());
    }

    #[tokio::test]
    async fn test_read_frame_stops_at_limit_without_newline() {
        let endless = vec![b'x'; 4096];
        let mut reader = BufReader::new(&endless[..]);
        let result: Result<Option<BrokerCommand>, _> = read_frame(&mut reader, 16).await;
        assert!(matches!(result, Err(BrokerError::FrameTooLarge { size: 17, limit: 16 })));
    }

    #[tokio::test]
    async fn test_read_frame_accepts_frame_at_limit() {
        let line = format!("{}\n", serde_json::to_string(&BrokerCommand::Ping).unwrap());
        let mut reader = BufReader::new(line.as_bytes());
        let frame: Option<BrokerCommand> = read_frame(&mut reader, line.len()).await.unwrap();
        assert_eq!(frame, Some(BrokerCommand::Ping));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_garbage() {
        let mut reader = BufReader::new(&b"not json\n"[..]);
        let result: Result<Option<BrokerCommand>, _> = read_frame(&mut reader, 1024).await;
        assert!(matches!(result, Err(BrokerError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_write_then_read_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &BrokerReply::Len { len: 3 }, 1024).await.unwrap();
        assert_eq!(buffer.last(), Some(&b'\n'));

        let mut reader = BufReader::new(&buffer[..]);
        let reply: Option<BrokerReply> = read_frame(&mut reader, 1024).await.unwrap();
        assert_eq!(reply, Some(BrokerReply::Len { len: 3 }));
    }

    #[tokio::test]
    async fn test_write_frame_rejects_oversized() {
        let mut buffer = Vec::new();
        let cmd = BrokerCommand::Push {
            queue: "q".to_string(),
            payload: vec![0; 64],
        };
        let result = write_frame(&mut buffer, &cmd, 16).await;
        assert!(matches!(result, Err(BrokerError::FrameTooLarge { .. })));
        assert!(buffer.is_empty());
    }
}
