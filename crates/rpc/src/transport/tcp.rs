//! JSON-RPC over length-delimited TCP frames.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use super::endpoint::Endpoint;
use super::framing::{DEFAULT_MAX_FRAME_SIZE, read_frame, write_frame};
use super::jsonrpc::{JsonRpcChannel, MessageReader, MessageWriter};
use super::{Channel, Dialer};
use crate::error::{RpcError, RpcResult};

struct FramedReader<S> {
    inner: ReadHalf<S>,
    max_frame_size: usize,
}

struct FramedWriter<S> {
    inner: WriteHalf<S>,
}

#[async_trait]
impl<S> MessageReader for FramedReader<S>
where
    S: AsyncRead + Send,
{
    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        read_frame(&mut self.inner, self.max_frame_size).await
    }
}

#[async_trait]
impl<S> MessageWriter for FramedWriter<S>
where
    S: AsyncWrite + Send,
{
    async fn send(&mut self, message: String) -> io::Result<()> {
        write_frame(&mut self.inner, message.as_bytes()).await
    }

    async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

impl JsonRpcChannel {
    /// JSON-RPC over a byte stream split into length-prefixed frames.
    ///
    /// Incoming frames above `max_frame_size` end the stream.
    pub fn framed<S>(stream: S, max_frame_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::new(
            FramedReader {
                inner: read_half,
                max_frame_size,
            },
            FramedWriter { inner: write_half },
        )
    }
}

/// Dials `tcp://host:port` (or bare `host:port`) endpoints.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a single dial after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Largest response frame accepted from the server. Requests are not capped.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

fn tcp_address(endpoint: &str) -> RpcResult<String> {
    match Endpoint::parse(endpoint)? {
        Endpoint::Tcp { addr } => Ok(addr),
        Endpoint::WebSocket { .. } => Err(RpcError::invalid_endpoint(
            endpoint,
            "websocket endpoint given to the tcp dialer",
        )),
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    fn check_endpoint(&self, endpoint: &str) -> RpcResult<()> {
        tcp_address(endpoint).map(|_| ())
    }

    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>> {
        let addr = tcp_address(endpoint)?;

        let connect = TcpStream::connect(addr.as_str());
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| RpcError::dial(endpoint, "connect timed out"))?,
            None => connect.await,
        }
        .map_err(|e| RpcError::dial(endpoint, e))?;

        if let Err(err) = stream.set_nodelay(true) {
            debug!(endpoint, error = %err, "failed to set TCP_NODELAY");
        }

        debug!(endpoint, "tcp channel established");
        Ok(Arc::new(JsonRpcChannel::framed(stream, self.max_frame_size)))
    }
}
