//! Caller and worker helpers
//!
//! Thin loops over a [`Transport`]: a [`Caller`] performs one round trip with
//! a deadline, a [`Worker`] answers requests until told to stop.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::{RemoteError, Request, Response};
use crate::error::TransportError;
use crate::transport::{Received, Transport};

/// Dispatches requests and waits for their replies
#[derive(Debug, Clone, Copy)]
pub struct Caller<'t, T> {
    transport: &'t T,
    timeout: Option<Duration>,
}

impl<'t, T: Transport> Caller<'t, T> {
    /// `timeout` bounds each wait for a reply; `None` waits forever
    pub fn new(transport: &'t T, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    /// Send `payload` under a fresh id and wait for the reply
    pub async fn call<P, R>(&self, payload: P) -> Result<Received<Response<R>>, TransportError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        self.call_request(&Request::new(payload)).await
    }

    /// Send `request` and wait for the reply
    ///
    /// On timeout the reply queue is discarded before returning, so a late
    /// reply is not left behind by an earlier answer.
    pub async fn call_request<P, R>(&self, request: &Request<P>) -> Result<Received<Response<R>>, TransportError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        debug!(id = %request.id, timeout = ?self.timeout, "Caller::call_request: called");
        self.transport.send_request(request).await?;

        let received = self.transport.recv_response(request, self.timeout).await?;
        if received.is_timeout() {
            warn!(id = %request.id, "No response before deadline, giving up");
            if let Err(e) = self.transport.discard_response(request).await {
                warn!(id = %request.id, error = %e, "Failed to discard response queue");
            }
        }
        Ok(received)
    }
}

/// Executes requests on the worker side
#[async_trait]
pub trait Handler: Send + Sync {
    type Payload: DeserializeOwned + Send + Sync;
    type Output: Serialize + Send + Sync;

    async fn handle(&self, request: &Request<Self::Payload>) -> Result<Self::Output, RemoteError>;
}

/// [`Handler`] backed by a plain function, see [`handler_fn`]
pub struct HandlerFn<F, P, R> {
    f: F,
    _marker: PhantomData<fn(P) -> R>,
}

/// Wrap a synchronous function as a [`Handler`]
pub fn handler_fn<F, P, R>(f: F) -> HandlerFn<F, P, R>
where
    F: Fn(&Request<P>) -> Result<R, RemoteError> + Send + Sync,
{
    HandlerFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, P, R> Handler for HandlerFn<F, P, R>
where
    F: Fn(&Request<P>) -> Result<R, RemoteError> + Send + Sync,
    P: DeserializeOwned + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
{
    type Payload = P;
    type Output = R;

    async fn handle(&self, request: &Request<P>) -> Result<R, RemoteError> {
        (self.f)(request)
    }
}

/// Counters from a worker run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    /// Requests answered with a result
    pub handled: u64,

    /// Requests answered with an error
    pub failed: u64,
}

/// Pulls requests off a transport and answers them with a handler
pub struct Worker<'t, T, H> {
    transport: &'t T,
    handler: H,
    poll_interval: Duration,
}

impl<'t, T: Transport, H: Handler> Worker<'t, T, H> {
    /// `poll_interval` is how long each receive waits before checking for shutdown
    pub fn new(transport: &'t T, handler: H, poll_interval: Duration) -> Self {
        Self {
            transport,
            handler,
            poll_interval,
        }
    }

    /// Answer requests until `shutdown` fires or its sender goes away
    ///
    /// A request being handled when shutdown arrives is still answered.
    /// Transport failures, including undecodable requests, end the loop.
    pub async fn serve(&self, mut shutdown: mpsc::Receiver<()>) -> Result<ServeStats, TransportError> {
        debug!(poll_interval = ?self.poll_interval, "Worker::serve: called");
        info!("Worker started");
        let mut stats = ServeStats::default();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Worker::serve: shutdown signal received");
                    break;
                }
                received = self.next_request(Some(self.poll_interval)) => {
                    if let Received::Message(request) = received? {
                        self.answer(&request, &mut stats).await?;
                    }
                }
            }
        }

        info!(handled = stats.handled, failed = stats.failed, "Worker stopped");
        Ok(stats)
    }

    /// Answer a single request, waiting up to `timeout` for one to arrive
    pub async fn handle_next(&self, timeout: Option<Duration>) -> Result<Received<ServeStats>, TransportError> {
        let mut stats = ServeStats::default();
        match self.next_request(timeout).await? {
            Received::Message(request) => {
                self.answer(&request, &mut stats).await?;
                Ok(Received::Message(stats))
            }
            Received::Timeout => Ok(Received::Timeout),
        }
    }

    async fn next_request(&self, timeout: Option<Duration>) -> Result<Received<Request<H::Payload>>, TransportError> {
        self.transport.recv_request(timeout).await
    }

    async fn answer(&self, request: &Request<H::Payload>, stats: &mut ServeStats) -> Result<(), TransportError> {
        let result = self.handler.handle(request).await;
        match &result {
            Ok(_) => stats.handled += 1,
            Err(e) => {
                debug!(id = %request.id, error = %e, "Worker::answer: handler failed");
                stats.failed += 1;
            }
        }
        self.transport
            .send_response(request, &Response::answering(request, result))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::transport::BrokerTransport;
    use queuebroker::{Broker, MemoryBroker};
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn pair(broker: &Arc<MemoryBroker>) -> (BrokerTransport, BrokerTransport) {
        let mut server = BrokerTransport::new(TransportConfig::default()).attached_to(broker.clone());
        let mut client = BrokerTransport::new(TransportConfig::default()).attached_to(broker.clone());
        server.bind("127.0.0.1", 0).await.unwrap();
        client.connect("127.0.0.1", 0).await.unwrap();
        (server, client)
    }

    fn doubler() -> HandlerFn<impl Fn(&Request<Value>) -> Result<Value, RemoteError> + Send + Sync, Value, Value> {
        handler_fn(|request: &Request<Value>| match request.payload.as_i64() {
            Some(n) => Ok(json!(n * 2)),
            None => Err(RemoteError::new("expected a number")),
        })
    }

    #[tokio::test]
    async fn test_handle_next_answers_one_request() {
        let broker = MemoryBroker::shared();
        let (server, client) = pair(&broker).await;

        let request = Request::with_id("r1", json!(21));
        client.send_request(&request).await.unwrap();

        let worker = Worker::new(&server, doubler(), Duration::from_millis(10));
        let stats = worker.handle_next(None).await.unwrap().into_message().unwrap();
        assert_eq!(stats, ServeStats { handled: 1, failed: 0 });

        let response: Response = client.recv_response(&request, None).await.unwrap().into_message().unwrap();
        assert_eq!(response.result, Ok(json!(42)));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_response() {
        let broker = MemoryBroker::shared();
        let (server, client) = pair(&broker).await;

        let request = Request::with_id("r2", json!("not a number"));
        client.send_request(&request).await.unwrap();

        let worker = Worker::new(&server, doubler(), Duration::from_millis(10));
        let stats = worker.handle_next(None).await.unwrap().into_message().unwrap();
        assert_eq!(stats.failed, 1);

        let response: Response = client.recv_response(&request, None).await.unwrap().into_message().unwrap();
        assert_eq!(response.result, Err(RemoteError::new("expected a number")));
    }

    #[tokio::test]
    async fn test_handle_next_timeout() {
        let broker = MemoryBroker::shared();
        let (server, _client) = pair(&broker).await;

        let worker = Worker::new(&server, doubler(), Duration::from_millis(10));
        let received = worker.handle_next(Some(Duration::from_millis(20))).await.unwrap();
        assert!(received.is_timeout());
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let broker = MemoryBroker::shared();
        let (server, client) = pair(&broker).await;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = Worker::new(&server, doubler(), Duration::from_millis(20));
        let caller = Caller::new(&client, Some(Duration::from_secs(2)));

        let calls = async {
            let mut results = Vec::new();
            for n in 1..=3 {
                let received: Received<Response> = caller.call(json!(n)).await.unwrap();
                results.push(received.into_message().unwrap().result.unwrap());
            }
            shutdown_tx.send(()).await.unwrap();
            results
        };

        let (stats, results) = tokio::join!(worker.serve(shutdown_rx), calls);
        assert_eq!(stats.unwrap(), ServeStats { handled: 3, failed: 0 });
        assert_eq!(results, vec![json!(2), json!(4), json!(6)]);
    }

    #[tokio::test]
    async fn test_serve_stops_on_undecodable_request() {
        let broker = MemoryBroker::shared();
        let (server, _client) = pair(&broker).await;
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);

        broker.push("requests", b"{broken".to_vec()).await.unwrap();

        let worker = Worker::new(&server, doubler(), Duration::from_millis(20));
        let err = worker.serve(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, TransportError::Deserialization { .. }));
    }

    #[tokio::test]
    async fn test_caller_timeout_discards_queue() {
        let broker = MemoryBroker::shared();
        let (_server, client) = pair(&broker).await;

        let caller = Caller::new(&client, Some(Duration::from_millis(30)));
        let request = Request::with_id("slow", json!(1));
        let received: Received<Response> = caller.call_request(&request).await.unwrap();

        assert!(received.is_timeout());
        assert_eq!(broker.len("response:slow").await.unwrap(), 0);
        // The request itself is still waiting for a worker
        assert_eq!(broker.len("requests").await.unwrap(), 1);
    }
}
