//! Duplex RPC channel abstraction (mechanics only).
//!
//! The session layer only needs two capabilities from a transport:
//!
//! - a [`Dialer`] that turns an endpoint address into a usable [`Channel`] (or fails)
//! - a [`Channel`] that issues one named call with a JSON payload and yields a JSON
//!   response (or fails)
//!
//! Implementations must report a dead channel as
//! [`ConnectivityError`](crate::error::ConnectivityError) so the invoker can tell it
//! apart from a remote rejection.
//!
//! Bundled: websocket ([`WsDialer`], the server's native transport), length-prefixed
//! TCP ([`TcpDialer`]), both behind [`EndpointDialer`], and [`InMemoryDialer`] for tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::RpcResult;

pub mod endpoint;
pub mod framing;
pub mod in_memory;
pub mod jsonrpc;
pub mod tcp;
pub mod ws;

pub use endpoint::Endpoint;
pub use in_memory::{CallRecord, InMemoryDialer};
pub use jsonrpc::{JsonRpcChannel, MessageReader, MessageWriter};
pub use tcp::TcpDialer;
pub use ws::WsDialer;

/// One established duplex channel.
///
/// Calls may be issued concurrently from multiple tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Issue `method` with `params` (`null` for "no request") and wait for the response.
    async fn call(&self, method: &str, params: JsonValue) -> RpcResult<JsonValue>;

    /// Stop accepting calls. Calls issued afterwards fail with `ChannelClosed`;
    /// calls already waiting for a response are left to complete.
    async fn close(&self);
}

/// Dial primitive: either returns a usable channel or an error.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Reject endpoints this dialer can never reach, without any IO.
    fn check_endpoint(&self, _endpoint: &str) -> RpcResult<()> {
        Ok(())
    }

    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>>;
}

#[async_trait]
impl<D> Dialer for Arc<D>
where
    D: Dialer + ?Sized,
{
    fn check_endpoint(&self, endpoint: &str) -> RpcResult<()> {
        (**self).check_endpoint(endpoint)
    }

    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>> {
        (**self).dial(endpoint).await
    }
}

/// Picks the transport from the endpoint scheme: `ws://` or `tcp://` / `host:port`.
#[derive(Debug, Clone, Default)]
pub struct EndpointDialer {
    pub tcp: TcpDialer,
    pub ws: WsDialer,
}

impl EndpointDialer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dialer for EndpointDialer {
    fn check_endpoint(&self, endpoint: &str) -> RpcResult<()> {
        Endpoint::parse(endpoint).map(|_| ())
    }

    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>> {
        if Endpoint::parse(endpoint)?.is_websocket() {
            self.ws.dial(endpoint).await
        } else {
            self.tcp.dial(endpoint).await
        }
    }
}

/// Identity comparison of two channel handles (ignores vtable metadata).
pub(crate) fn same_channel(a: &Arc<dyn Channel>, b: &Arc<dyn Channel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
