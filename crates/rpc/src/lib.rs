//! `pipeline-rpc` — resilient worker session against the pipeline queue server.
//!
//! Layers, leaves first:
//!
//! - [`transport`]: the duplex [`Channel`](transport::Channel) / [`Dialer`](transport::Dialer)
//!   seam, with JSON-RPC over websocket or length-prefixed TCP, and an in-memory
//!   transport for tests
//! - [`connection`]: owns the single live channel, dials with bounded retry, shuts down
//! - [`invoker`]: issues one call and replays it once after a connectivity failure
//! - [`client`]: the [`Peer`] operations (`next`, `notify`, `extend`, `update`, `log`, `save`)

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod invoker;
pub mod log_stream;
pub mod peer;
pub mod transport;
pub mod wire;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, RetryPolicy};
pub use connection::ConnectionManager;
pub use error::{ConnectivityError, RpcError, RpcResult};
pub use invoker::Invoker;
pub use log_stream::LineWriter;
pub use peer::Peer;
pub use transport::{
    CallRecord, Channel, Dialer, Endpoint, EndpointDialer, InMemoryDialer, JsonRpcChannel, TcpDialer,
    WsDialer,
};
