//! QueueBroker - minimal named-queue broker
//!
//! Provides the two primitives a request/response transport needs: push a byte
//! payload onto a named queue, and block-pop a payload from a named queue with
//! an optional deadline. Queues live in memory for the lifetime of the broker.
//!
//! # Architecture
//!
//! ```text
//! RemoteBroker ──TCP (JSON lines)──▶ BrokerServer ──▶ MemoryBroker
//!                                                      ├── "requests"    [b1, b2, ...]
//!                                                      └── "response:42" [b3]
//! ```
//!
//! Anything implementing [`Broker`] can back a transport; [`MemoryBroker`] is
//! the in-process implementation and [`RemoteBroker`] reaches one over the
//! network.
//!
//! # Example
//!
//! ```ignore
//! use queuebroker::{Broker, BrokerServer, MemoryBroker, Popped};
//!
//! let server = BrokerServer::bind("127.0.0.1:7700", MemoryBroker::shared(), Default::default()).await?;
//! server.broker().push("jobs", b"hello".to_vec()).await?;
//! let item = server.broker().blocking_pop("jobs", None).await?;
//! assert_eq!(item, Popped::Item(b"hello".to_vec()));
//! ```

pub mod cli;
pub mod config;
mod broker;
mod client;
mod error;
mod memory;
pub mod protocol;
mod server;

pub use broker::{Broker, Popped};
pub use client::{ClientOptions, RemoteBroker};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use server::{BrokerServer, ServerOptions};

/// Default broker port
pub const DEFAULT_PORT: u16 = 7700;

/// Default maximum size of a single wire frame (64MB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
