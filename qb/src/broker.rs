//! Broker capability trait

use std::time::Duration;

use async_trait::async_trait;

use crate::BrokerError;

/// Outcome of a blocking pop
///
/// Running out of time is an expected result, so it is a variant rather than
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    /// Payload taken from the head of the queue
    Item(Vec<u8>),

    /// The deadline passed before anything arrived
    Timeout,
}

impl Popped {
    /// Get the payload, if one was popped
    pub fn into_item(self) -> Option<Vec<u8>> {
        match self {
            Popped::Item(payload) => Some(payload),
            Popped::Timeout => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Popped::Timeout)
    }
}

/// Named FIFO queues with blocking pop
///
/// The broker is the only synchronization point between producers and
/// consumers. Implementations must keep each queue first-in-first-out and must
/// hand every pushed payload to at most one popper.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a payload to the tail of `queue`, creating the queue if needed
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Take the payload at the head of `queue`, waiting for one to arrive
    ///
    /// `None` waits indefinitely. With `Some(limit)` the call returns
    /// [`Popped::Timeout`] no earlier than `limit` after it started.
    async fn blocking_pop(&self, queue: &str, timeout: Option<Duration>) -> Result<Popped, BrokerError>;

    /// Drop `queue` and everything in it. Returns whether it held anything.
    async fn delete(&self, queue: &str) -> Result<bool, BrokerError>;

    /// Number of payloads waiting in `queue`
    async fn len(&self, queue: &str) -> Result<usize, BrokerError>;

    /// Liveness check
    async fn ping(&self) -> Result<bool, BrokerError>;
}
