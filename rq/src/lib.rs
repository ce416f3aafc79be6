//! QueueRPC - request/response messaging over a named-queue broker
//!
//! Callers push [`Request`]s onto one shared queue; workers pop them, do the
//! work, and push a [`Response`] onto a queue named after the request id. The
//! broker only has to offer push, blocking pop with a timeout, and ping.
//!
//! # Example
//!
//! ```ignore
//! use queuerpc::{BrokerTransport, Request, Response, Transport};
//! use queuerpc::config::TransportConfig;
//!
//! let mut server = BrokerTransport::new(TransportConfig::default());
//! server.bind("127.0.0.1", 7700).await?;
//!
//! let mut client = BrokerTransport::new(TransportConfig::default());
//! client.connect("127.0.0.1", 7700).await?;
//!
//! let request = Request::with_id("abc123", serde_json::json!({"op": "status"}));
//! client.send_request(&request).await?;
//!
//! let incoming: Request = server.recv_request(None).await?.into_message().unwrap();
//! server.send_response(&incoming, &Response::ok("abc123", "ok")).await?;
//!
//! let reply: Response<String> = client.recv_response(&request, None).await?.into_message().unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod dispatch;
mod envelope;
mod error;
mod serializer;
pub mod transport;

pub use dispatch::{Caller, Handler, ServeStats, Worker, handler_fn};
pub use envelope::{RemoteError, Request, RequestId, Response};
pub use error::TransportError;
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer, SerializerError};
pub use transport::{BrokerTransport, QueueNames, Received, Transport, TransportState};
