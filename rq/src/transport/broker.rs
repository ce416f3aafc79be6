//! Broker-backed transport
//!
//! Maps the [`Transport`] contract onto [`Broker`] push and blocking pop. In
//! the default network mode, `bind` starts an embedded broker server on the
//! address and `connect` reaches one over TCP. An attached transport uses a
//! broker handed to it instead, which is how other substrates plug in.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use queuebroker::{Broker, BrokerServer, MemoryBroker, Popped, RemoteBroker};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{QueueNames, Received, Transport, TransportState};
use crate::config::{ResponseCleanup, TransportConfig};
use crate::envelope::{Request, Response};
use crate::error::TransportError;
use crate::serializer::{JsonSerializer, Serializer};

/// Where the broker comes from on bind/connect
enum Backend {
    Network,
    Attached(Arc<dyn Broker>),
}

/// Live broker handle, present while bound or connected
struct Link {
    broker: Arc<dyn Broker>,
    server: Option<BrokerServer>,
    addr: String,
}

/// [`Transport`] over a named-queue broker
pub struct BrokerTransport<S: Serializer = JsonSerializer> {
    config: TransportConfig,
    queues: QueueNames,
    serializer: S,
    backend: Backend,
    state: TransportState,
    link: Option<Link>,
}

impl BrokerTransport<JsonSerializer> {
    /// Create an unbound network transport using JSON envelopes
    pub fn new(config: TransportConfig) -> Self {
        let queues = config.queue_names();
        Self {
            config,
            queues,
            serializer: JsonSerializer,
            backend: Backend::Network,
            state: TransportState::Unbound,
            link: None,
        }
    }
}

impl<S: Serializer> BrokerTransport<S> {
    /// Use `broker` instead of the network for bind and connect
    pub fn attached_to(mut self, broker: Arc<dyn Broker>) -> Self {
        self.backend = Backend::Attached(broker);
        self
    }

    /// Swap the envelope encoding
    pub fn with_serializer<T: Serializer>(self, serializer: T) -> BrokerTransport<T> {
        BrokerTransport {
            config: self.config,
            queues: self.queues,
            serializer,
            backend: self.backend,
            state: self.state,
            link: self.link,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Address of the embedded broker server, when this transport runs one
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link
            .as_ref()
            .and_then(|link| link.server.as_ref())
            .map(BrokerServer::local_addr)
    }

    fn expect_unbound(&self, operation: &'static str) -> Result<(), TransportError> {
        if self.state == TransportState::Unbound {
            Ok(())
        } else {
            Err(TransportError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn broker(&self, operation: &'static str) -> Result<&Arc<dyn Broker>, TransportError> {
        match &self.link {
            Some(link) if self.state.is_open() => Ok(&link.broker),
            _ => Err(TransportError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn encode<T: Serialize>(&self, what: &'static str, value: &T) -> Result<Vec<u8>, TransportError> {
        self.serializer
            .encode(value)
            .map_err(|source| TransportError::Serialization { what, source })
    }

    fn decode<T: DeserializeOwned>(&self, what: &'static str, queue: &str, bytes: &[u8]) -> Result<T, TransportError> {
        self.serializer
            .decode(bytes)
            .map_err(|source| TransportError::Deserialization {
                what,
                queue: queue.to_string(),
                source,
            })
    }
}

impl<S: Serializer> fmt::Debug for BrokerTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerTransport")
            .field("state", &self.state)
            .field("addr", &self.link.as_ref().map(|link| link.addr.as_str()))
            .field("serializer", &self.serializer.name())
            .field("queues", &self.queues)
            .finish()
    }
}

/// `host:port`, bracketing bare IPv6 hosts
fn broker_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[async_trait]
impl<S: Serializer> Transport for BrokerTransport<S> {
    async fn bind(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        debug!(%host, %port, "BrokerTransport::bind: called");
        self.expect_unbound("bind")?;

        let addr = broker_addr(host, port);
        let (broker, server): (Arc<dyn Broker>, Option<BrokerServer>) = match &self.backend {
            Backend::Network => {
                let server = BrokerServer::bind(&addr, MemoryBroker::shared(), self.config.server_options()).await?;
                let broker: Arc<dyn Broker> = server.broker().clone();
                (broker, Some(server))
            }
            Backend::Attached(broker) => (broker.clone(), None),
        };

        if broker.delete(&self.queues.requests).await? {
            info!(queue = %self.queues.requests, "Discarded requests left from a previous run");
        }

        info!(%addr, serializer = self.serializer.name(), "Transport bound");
        self.link = Some(Link { broker, server, addr });
        self.state = TransportState::Bound;
        Ok(())
    }

    async fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        debug!(%host, %port, "BrokerTransport::connect: called");
        self.expect_unbound("connect")?;

        let addr = broker_addr(host, port);
        let broker: Arc<dyn Broker> = match &self.backend {
            Backend::Network => Arc::new(RemoteBroker::new(addr.clone()).with_options(self.config.client_options())),
            Backend::Attached(broker) => broker.clone(),
        };

        broker.ping().await?;

        info!(%addr, serializer = self.serializer.name(), "Transport connected");
        self.link = Some(Link {
            broker,
            server: None,
            addr,
        });
        self.state = TransportState::Connected;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!(state = %self.state, "BrokerTransport::close: called");
        if self.state == TransportState::Closed {
            return Ok(());
        }

        if let Some(mut link) = self.link.take() {
            if let Some(server) = link.server.as_mut() {
                server.shutdown().await;
            }
            info!(addr = %link.addr, "Transport closed");
        }
        self.state = TransportState::Closed;
        Ok(())
    }

    async fn ping(&self) -> Result<bool, TransportError> {
        debug!("BrokerTransport::ping: called");
        let broker = self.broker("ping")?;
        Ok(broker.ping().await?)
    }

    async fn send_request<P>(&self, request: &Request<P>) -> Result<(), TransportError>
    where
        P: Serialize + Sync,
    {
        debug!(id = %request.id, "BrokerTransport::send_request: called");
        let broker = self.broker("send_request")?;
        let bytes = self.encode("request", request)?;
        broker.push(&self.queues.requests, bytes).await?;
        Ok(())
    }

    async fn recv_request<P>(&self, timeout: Option<Duration>) -> Result<Received<Request<P>>, TransportError>
    where
        P: DeserializeOwned + Send,
    {
        debug!(?timeout, "BrokerTransport::recv_request: called");
        let broker = self.broker("recv_request")?;

        match broker.blocking_pop(&self.queues.requests, timeout).await? {
            Popped::Timeout => Ok(Received::Timeout),
            Popped::Item(bytes) => {
                let request: Request<P> = self.decode("request", &self.queues.requests, &bytes)?;
                debug!(id = %request.id, "BrokerTransport::recv_request: received");
                Ok(Received::Message(request))
            }
        }
    }

    async fn send_response<P, R>(&self, request: &Request<P>, response: &Response<R>) -> Result<(), TransportError>
    where
        P: Sync,
        R: Serialize + Sync,
    {
        debug!(id = %request.id, ok = response.is_ok(), "BrokerTransport::send_response: called");
        let broker = self.broker("send_response")?;

        if response.id != request.id {
            return Err(TransportError::Correlation {
                expected: request.id.clone(),
                actual: response.id.clone(),
            });
        }

        let bytes = self.encode("response", response)?;
        broker.push(&self.queues.response_queue(&request.id), bytes).await?;
        Ok(())
    }

    async fn recv_response<P, R>(
        &self,
        request: &Request<P>,
        timeout: Option<Duration>,
    ) -> Result<Received<Response<R>>, TransportError>
    where
        P: Sync,
        R: DeserializeOwned + Send,
    {
        debug!(id = %request.id, ?timeout, "BrokerTransport::recv_response: called");
        let broker = self.broker("recv_response")?;
        let queue = self.queues.response_queue(&request.id);

        let bytes = match broker.blocking_pop(&queue, timeout).await? {
            Popped::Timeout => {
                debug!(id = %request.id, "BrokerTransport::recv_response: timed out");
                return Ok(Received::Timeout);
            }
            Popped::Item(bytes) => bytes,
        };

        let response: Response<R> = self.decode("response", &queue, &bytes)?;
        if response.id != request.id {
            return Err(TransportError::Correlation {
                expected: request.id.clone(),
                actual: response.id,
            });
        }

        if self.config.cleanup == ResponseCleanup::Delete {
            // The reply is already in hand; a failed cleanup only leaves a stray queue
            match broker.delete(&queue).await {
                Ok(true) => warn!(id = %request.id, "Dropped extra responses for request"),
                Ok(false) => {}
                Err(e) => warn!(id = %request.id, error = %e, "Failed to delete response queue"),
            }
        }

        Ok(Received::Message(response))
    }

    async fn discard_response<P>(&self, request: &Request<P>) -> Result<(), TransportError>
    where
        P: Sync,
    {
        debug!(id = %request.id, "BrokerTransport::discard_response: called");
        let broker = self.broker("discard_response")?;
        if broker.delete(&self.queues.response_queue(&request.id)).await? {
            debug!(id = %request.id, "BrokerTransport::discard_response: dropped pending response");
        }
        Ok(())
    }
}
