//! Request and response envelopes
//!
//! A [`Request`] carries a correlation id chosen by the caller and an opaque
//! payload. The matching [`Response`] echoes the id so the reply can be routed
//! to the one caller waiting for it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation id shared by a request and its response
///
/// Must be unique among all requests in flight at the same time. The transport
/// never makes one up; callers either bring their own or use
/// [`RequestId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered unique id (UUID v7)
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A unit of work for a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<P = serde_json::Value> {
    pub id: RequestId,
    pub payload: P,
}

impl<P> Request<P> {
    /// Create a request with a generated id
    pub fn new(payload: P) -> Self {
        Self {
            id: RequestId::generate(),
            payload,
        }
    }

    /// Create a request with a caller-chosen id
    pub fn with_id(id: impl Into<RequestId>, payload: P) -> Self {
        Self { id: id.into(), payload }
    }
}

/// Failure reported by the worker that handled a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// The answer to exactly one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<R = serde_json::Value> {
    /// Id of the request this answers
    pub id: RequestId,

    /// What the worker produced, or why it could not
    pub result: Result<R, RemoteError>,
}

impl<R> Response<R> {
    pub fn ok(id: impl Into<RequestId>, result: R) -> Self {
        Self {
            id: id.into(),
            result: Ok(result),
        }
    }

    pub fn error(id: impl Into<RequestId>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Err(RemoteError::new(message)),
        }
    }

    /// Build the response for `request` from a handler outcome
    pub fn answering<P>(request: &Request<P>, result: Result<R, RemoteError>) -> Self {
        Self {
            id: request.id.clone(),
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<R, RemoteError> {
        self.result
    }
}
