//! Broker server
//!
//! Exposes a [`MemoryBroker`] over TCP. Every connection is served on its own
//! task; commands on one connection are handled in order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::{BrokerCommand, BrokerReply, read_frame, write_frame};
use crate::{Broker, BrokerError, DEFAULT_MAX_FRAME_BYTES, MemoryBroker, Popped};

/// Default gap between heartbeats sent to a client parked on a pop
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Longest heartbeat gap honored, so the first tick stays representable
const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Server tuning
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Largest frame accepted or sent, in bytes
    pub max_frame_bytes: usize,

    /// How often a waiting pop tells its client the broker is still there
    pub heartbeat_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// A running broker listener
///
/// Dropping the server stops it; prefer [`BrokerServer::shutdown`] to wait
/// until the port is released.
#[derive(Debug)]
pub struct BrokerServer {
    broker: Arc<MemoryBroker>,
    local_addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl BrokerServer {
    /// Bind `addr` and start serving `broker`
    pub async fn bind(addr: &str, broker: Arc<MemoryBroker>, options: ServerOptions) -> Result<Self, BrokerError> {
        debug!(%addr, "BrokerServer::bind: called");

        let listener = TcpListener::bind(addr).await.map_err(|source| BrokerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Broker listening");

        let accept_task = tokio::spawn(accept_loop(listener, broker.clone(), options));

        Ok(Self {
            broker,
            local_addr,
            accept_task: Some(accept_task),
        })
    }

    /// The broker behind this server, for in-process use
    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop accepting and drop every open connection
    ///
    /// Returns once the listener is closed. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            debug!(local_addr = %self.local_addr, "BrokerServer::shutdown: stopping");
            task.abort();
            let _ = task.await;
            info!(local_addr = %self.local_addr, "Broker stopped");
        }
    }
}

impl Drop for BrokerServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, broker: Arc<MemoryBroker>, options: ServerOptions) {
    // Dropping the set when this task is aborted aborts every connection
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accept_loop: connection accepted");
                    let broker = broker.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_connection(stream, broker, options).await {
                            warn!(%peer, error = %e, "Broker connection error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Broker accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream, broker: Arc<MemoryBroker>, options: ServerOptions) -> Result<(), BrokerError> {
    let limit = options.max_frame_bytes;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(command) = read_frame::<_, BrokerCommand>(&mut reader, limit).await? {
        debug!(?command, "serve_connection: command received");

        let reply = match command {
            BrokerCommand::Push { queue, payload } => match broker.push(&queue, payload).await {
                Ok(()) => BrokerReply::Ok,
                Err(e) => BrokerReply::Error { message: e.to_string() },
            },
            BrokerCommand::Pop { queue, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis);
                let pop = broker.blocking_pop(&queue, timeout);
                tokio::pin!(pop);

                let period = options.heartbeat_interval.clamp(Duration::from_millis(1), MAX_HEARTBEAT_INTERVAL);
                let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);

                let popped = loop {
                    tokio::select! {
                        popped = &mut pop => break popped,
                        _ = hangup(&mut reader) => {
                            debug!(%queue, "serve_connection: client left while waiting");
                            return Ok(());
                        }
                        _ = heartbeat.tick() => {
                            // Dropping the pending pop on failure leaves the queue untouched
                            write_frame(&mut write_half, &BrokerReply::Waiting, limit).await?;
                        }
                    }
                };

                match popped {
                    Ok(Popped::Item(payload)) => {
                        let reply = BrokerReply::Item { payload };
                        if let Err(e) = write_frame(&mut write_half, &reply, limit).await {
                            if let BrokerReply::Item { payload } = reply {
                                warn!(%queue, "Delivery failed, returning item to queue");
                                broker.requeue(&queue, payload);
                            }
                            return Err(e);
                        }
                        continue;
                    }
                    Ok(Popped::Timeout) => BrokerReply::Timeout,
                    Err(e) => BrokerReply::Error { message: e.to_string() },
                }
            }
            BrokerCommand::Delete { queue } => match broker.delete(&queue).await {
                Ok(existed) => BrokerReply::Deleted { existed },
                Err(e) => BrokerReply::Error { message: e.to_string() },
            },
            BrokerCommand::Len { queue } => match broker.len(&queue).await {
                Ok(len) => BrokerReply::Len { len },
                Err(e) => BrokerReply::Error { message: e.to_string() },
            },
            BrokerCommand::Ping => BrokerReply::Pong,
        };

        write_frame(&mut write_half, &reply, limit).await?;
    }

    debug!("serve_connection: client closed connection");
    Ok(())
}

/// Resolves when the peer closes its end; never resolves if it sends more data
async fn hangup<R: AsyncBufRead + Unpin>(reader: &mut R) {
    match reader.fill_buf().await {
        Ok(buf) if !buf.is_empty() => std::future::pending::<()>().await,
        _ => {}
    }
}
