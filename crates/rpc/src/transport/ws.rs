//! JSON-RPC over websocket: one text message per JSON-RPC message.
//!
//! This is the queue server's native transport (`ws://host/path`).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::debug;

use super::endpoint::Endpoint;
use super::jsonrpc::{JsonRpcChannel, MessageReader, MessageWriter};
use super::{Channel, Dialer};
use crate::error::{RpcError, RpcResult};

/// Default cap on incoming websocket messages (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

struct WsReader<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

struct WsWriter<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, err)
}

#[async_trait]
impl<S> MessageReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let message = match self.inner.next().await {
                Some(message) => message.map_err(ws_error)?,
                None => return Err(io::ErrorKind::UnexpectedEof.into()),
            };
            match message {
                Message::Text(text) => return Ok(text.into_bytes()),
                Message::Binary(data) => return Ok(data),
                Message::Close(frame) => {
                    debug!(?frame, "websocket closed by server");
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                // Pings are answered by the protocol layer.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

#[async_trait]
impl<S> MessageWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn send(&mut self, message: String) -> io::Result<()> {
        self.inner.send(Message::Text(message)).await.map_err(ws_error)
    }

    async fn shutdown(&mut self) {
        let _ = self.inner.close().await;
    }
}

impl JsonRpcChannel {
    /// JSON-RPC over an established websocket.
    pub fn websocket<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, stream) = stream.split();
        Self::new(WsReader { inner: stream }, WsWriter { inner: sink })
    }
}

/// Dials `ws://` endpoints.
#[derive(Debug, Clone)]
pub struct WsDialer {
    connect_timeout: Option<Duration>,
    max_message_size: usize,
}

impl Default for WsDialer {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl WsDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a single dial (TCP connect plus handshake) after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Largest message accepted from the server. Requests are not capped.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    fn config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

fn ws_url(endpoint: &str) -> RpcResult<String> {
    match Endpoint::parse(endpoint)? {
        Endpoint::WebSocket { url } => Ok(url),
        Endpoint::Tcp { .. } => Err(RpcError::invalid_endpoint(
            endpoint,
            "tcp endpoint given to the websocket dialer",
        )),
    }
}

#[async_trait]
impl Dialer for WsDialer {
    fn check_endpoint(&self, endpoint: &str) -> RpcResult<()> {
        ws_url(endpoint).map(|_| ())
    }

    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>> {
        let url = ws_url(endpoint)?;

        let connect = tokio_tungstenite::connect_async_with_config(url, Some(self.config()), true);
        let (stream, response) = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| RpcError::dial(endpoint, "connect timed out"))?,
            None => connect.await,
        }
        .map_err(|e| RpcError::dial(endpoint, e))?;

        debug!(endpoint, status = %response.status(), "websocket channel established");
        Ok(Arc::new(JsonRpcChannel::websocket(stream)))
    }
}
