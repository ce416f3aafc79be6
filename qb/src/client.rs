//! Broker client
//!
//! Reaches a [`BrokerServer`](crate::BrokerServer) over TCP. Each command uses
//! a fresh connection, so one client can be shared freely between tasks and a
//! long blocking pop never holds up anything else.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use crate::protocol::{BrokerCommand, BrokerReply, read_frame, write_frame};
use crate::{Broker, BrokerError, DEFAULT_MAX_FRAME_BYTES, Popped};

/// Default timeout for connecting and for non-blocking commands
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default silence after which a broker is given up on
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Client tuning
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// How long to wait for the TCP connection
    pub connect_timeout: Duration,

    /// How long to wait for a reply to anything but a pop, and the grace
    /// period added on top of a pop's own deadline
    pub io_timeout: Duration,

    /// Largest frame accepted or sent, in bytes
    pub max_frame_bytes: usize,

    /// Longest silence tolerated while waiting on a reply. Must exceed the
    /// server's heartbeat interval, or parked pops fail spuriously.
    pub idle_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            io_timeout: DEFAULT_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// [`Broker`] implementation talking to a remote broker server
#[derive(Debug, Clone)]
pub struct RemoteBroker {
    addr: String,
    options: ClientOptions,
}

impl RemoteBroker {
    /// Create a client for the broker at `addr` (`host:port`)
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            options: ClientOptions::default(),
        }
    }

    /// Set custom timeouts and limits
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn open(&self) -> Result<TcpStream, BrokerError> {
        tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| self.unresponsive(self.options.connect_timeout))?
            .map_err(|source| BrokerError::Unreachable {
                addr: self.addr.clone(),
                source,
            })
    }

    /// Send one command and read its reply
    ///
    /// `wait` bounds the time spent waiting for the reply; `None` waits as
    /// long as the server keeps sending heartbeats. A server silent for
    /// longer than `idle_timeout` is treated as gone.
    async fn request(&self, command: &BrokerCommand, wait: Option<Duration>) -> Result<BrokerReply, BrokerError> {
        debug!(addr = %self.addr, ?command, "RemoteBroker::request: sending command");
        let limit = self.options.max_frame_bytes;

        let stream = self.open().await?;
        let (read_half, mut write_half) = stream.into_split();

        tokio::time::timeout(self.options.io_timeout, write_frame(&mut write_half, command, limit))
            .await
            .map_err(|_| self.unresponsive(self.options.io_timeout))??;

        let mut reader = BufReader::new(read_half);
        let deadline = wait.and_then(|wait| Instant::now().checked_add(wait));
        let idle = self.options.idle_timeout;
        let reply = loop {
            let next = tokio::time::timeout(idle, read_frame::<_, BrokerReply>(&mut reader, limit));
            let frame = match (deadline, wait) {
                (Some(deadline), Some(wait)) => tokio::time::timeout_at(deadline, next)
                    .await
                    .map_err(|_| self.unresponsive(wait))?,
                _ => next.await,
            };
            match frame.map_err(|_| self.unresponsive(idle))?? {
                Some(BrokerReply::Waiting) => continue,
                other => break other,
            }
        };

        match reply {
            Some(BrokerReply::Error { message }) => Err(BrokerError::Remote(message)),
            Some(reply) => {
                debug!(?reply, "RemoteBroker::request: received reply");
                Ok(reply)
            }
            None => Err(BrokerError::Disconnected {
                addr: self.addr.clone(),
            }),
        }
    }

    fn unresponsive(&self, timeout: Duration) -> BrokerError {
        BrokerError::Unresponsive {
            addr: self.addr.clone(),
            timeout_ms: millis_ceil(timeout),
        }
    }
}

fn unexpected(reply: BrokerReply) -> BrokerError {
    BrokerError::Protocol(format!("Unexpected reply: {:?}", reply))
}

/// Whole milliseconds, rounded up so a remote deadline never fires early
fn millis_ceil(duration: Duration) -> u64 {
    let nanos = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

#[async_trait]
impl Broker for RemoteBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let command = BrokerCommand::Push {
            queue: queue.to_string(),
            payload,
        };
        match self.request(&command, Some(self.options.io_timeout)).await? {
            BrokerReply::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn blocking_pop(&self, queue: &str, timeout: Option<Duration>) -> Result<Popped, BrokerError> {
        let command = BrokerCommand::Pop {
            queue: queue.to_string(),
            timeout_ms: timeout.map(millis_ceil),
        };
        let wait = timeout.map(|limit| limit.saturating_add(self.options.io_timeout));
        match self.request(&command, wait).await? {
            BrokerReply::Item { payload } => Ok(Popped::Item(payload)),
            BrokerReply::Timeout => Ok(Popped::Timeout),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, queue: &str) -> Result<bool, BrokerError> {
        let command = BrokerCommand::Delete {
            queue: queue.to_string(),
        };
        match self.request(&command, Some(self.options.io_timeout)).await? {
            BrokerReply::Deleted { existed } => Ok(existed),
            other => Err(unexpected(other)),
        }
    }

    async fn len(&self, queue: &str) -> Result<usize, BrokerError> {
        let command = BrokerCommand::Len {
            queue: queue.to_string(),
        };
        match self.request(&command, Some(self.options.io_timeout)).await? {
            BrokerReply::Len { len } => Ok(len),
            other => Err(unexpected(other)),
        }
    }

    async fn ping(&self) -> Result<bool, BrokerError> {
        match self.request(&BrokerCommand::Ping, Some(self.options.io_timeout)).await? {
            BrokerReply::Pong => Ok(true),
            other => Err(unexpected(other)),
        }
    }
}
