//! Transport contract
//!
//! A transport moves [`Request`]s from callers to workers over one shared
//! queue, and each [`Response`] back over a queue named after its request id.
//! Pairing a reply with its caller needs nothing from the broker beyond push
//! and blocking pop: only the caller knows the id, so only it waits on that
//! queue.
//!
//! ```text
//! caller ──send_request──▶ [requests] ──recv_request──▶ worker
//! caller ◀─recv_response── [response:<id>] ◀─send_response── worker
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::envelope::{Request, Response};
use crate::error::TransportError;

mod broker;
mod queues;

pub use broker::BrokerTransport;
pub use queues::QueueNames;

/// Lifecycle of a transport
///
/// `Unbound → {Bound, Connected} → Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, no broker yet
    Unbound,

    /// Owns the broker (server role)
    Bound,

    /// Attached to someone else's broker (peer role)
    Connected,

    /// Released; every further operation is refused
    Closed,
}

impl TransportState {
    /// Check if queue operations are allowed
    pub fn is_open(&self) -> bool {
        matches!(self, TransportState::Bound | TransportState::Connected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Unbound => "unbound",
            TransportState::Bound => "bound",
            TransportState::Connected => "connected",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of a blocking receive
///
/// Timing out is the normal way for a caller to regain control, so it is a
/// value rather than an error.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Received<T> {
    Message(T),
    Timeout,
}

impl<T> Received<T> {
    pub fn into_message(self) -> Option<T> {
        match self {
            Received::Message(message) => Some(message),
            Received::Timeout => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Received::Timeout)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Received<U> {
        match self {
            Received::Message(message) => Received::Message(f(message)),
            Received::Timeout => Received::Timeout,
        }
    }
}

/// Request/response transport over a shared broker
///
/// No operation retries or reconnects; every failure goes straight back to
/// the caller. Receives take an optional timeout where `None` blocks until
/// something arrives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Take ownership of the broker at `host:port` and clear the request queue
    async fn bind(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Attach to the broker at `host:port` without touching its queues
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Release the broker. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check that the broker answers
    async fn ping(&self) -> Result<bool, TransportError>;

    /// Enqueue `request` on the shared request queue
    async fn send_request<P>(&self, request: &Request<P>) -> Result<(), TransportError>
    where
        P: Serialize + Sync;

    /// Wait for the next request on the shared request queue
    async fn recv_request<P>(&self, timeout: Option<Duration>) -> Result<Received<Request<P>>, TransportError>
    where
        P: DeserializeOwned + Send;

    /// Enqueue `response` on the reply queue of `request`
    async fn send_response<P, R>(&self, request: &Request<P>, response: &Response<R>) -> Result<(), TransportError>
    where
        P: Sync,
        R: Serialize + Sync;

    /// Wait for the reply to `request`
    async fn recv_response<P, R>(
        &self,
        request: &Request<P>,
        timeout: Option<Duration>,
    ) -> Result<Received<Response<R>>, TransportError>
    where
        P: Sync,
        R: DeserializeOwned + Send;

    /// Drop the reply queue of `request`, e.g. after giving up on it
    async fn discard_response<P>(&self, request: &Request<P>) -> Result<(), TransportError>
    where
        P: Sync;
}
