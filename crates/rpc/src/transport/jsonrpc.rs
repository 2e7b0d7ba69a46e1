//! JSON-RPC 2.0 client channel over any message-oriented stream.
//!
//! Requests are written under a writer lock; a background reader task routes
//! responses back to the waiting caller by request id, so any number of calls
//! can be in flight at once. The message boundary comes from the stream
//! ([`MessageReader`] / [`MessageWriter`]): length-prefixed frames for TCP, one
//! websocket message per JSON-RPC message for websockets.
//!
//! When the stream ends, every outstanding call fails with `UnexpectedEof` and
//! every later call with `ChannelClosed`.
//!
//! [`Channel::close`] only stops new calls. Calls already waiting keep their
//! response routing; the writer is shut down once the last of them settles.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Channel;
use crate::error::{ConnectivityError, RpcError, RpcResult};

const JSONRPC_VERSION: &str = "2.0";

/// Sending half of a message stream.
#[async_trait]
pub trait MessageWriter: Send {
    /// Send one complete JSON-RPC message.
    async fn send(&mut self, message: String) -> io::Result<()>;

    /// Tell the peer no more messages follow. Errors are not interesting here.
    async fn shutdown(&mut self);
}

/// Receiving half of a message stream.
#[async_trait]
pub trait MessageReader: Send {
    /// Next complete message. Any error ends the stream.
    async fn recv(&mut self) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    params: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    id: Option<u64>,
    /// Present only on server-initiated messages, which this client ignores.
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: JsonValue,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

impl ResponseFrame {
    fn into_result(self) -> RpcResult<JsonValue> {
        match self.error {
            Some(err) => Err(RpcError::application(err.code, err.message)),
            None => Ok(self.result),
        }
    }
}

type Waiter = oneshot::Sender<RpcResult<JsonValue>>;

#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, Waiter>,
    closed: bool,
    /// Fired when the channel is closed and the last waiter settles.
    on_idle: Option<oneshot::Sender<()>>,
}

impl Pending {
    fn take(&mut self, id: u64) -> Option<Waiter> {
        let waiter = self.waiters.remove(&id);
        self.notify_if_idle();
        waiter
    }

    fn fail_all(&mut self, err: ConnectivityError) {
        self.closed = true;
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(err.into()));
        }
        self.notify_if_idle();
    }

    fn notify_if_idle(&mut self) {
        if self.closed && self.waiters.is_empty() {
            if let Some(idle) = self.on_idle.take() {
                let _ = idle.send(());
            }
        }
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn MessageWriter>>>;

/// A JSON-RPC channel over a message stream.
pub struct JsonRpcChannel {
    writer: SharedWriter,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl JsonRpcChannel {
    /// Start the response reader task over `reader` and send requests through `writer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: MessageReader + 'static,
        W: MessageWriter + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_loop(reader, pending.clone()));

        Self {
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    fn forget(&self, id: u64) {
        lock(&self.pending).take(id);
    }
}

impl Drop for JsonRpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(mut reader: R, pending: Arc<Mutex<Pending>>)
where
    R: MessageReader,
{
    loop {
        let message = match reader.recv().await {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "rpc stream ended");
                break;
            }
        };

        let response: ResponseFrame = match serde_json::from_slice(&message) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "discarding malformed rpc message");
                continue;
            }
        };

        if let Some(method) = &response.method {
            debug!(method = %method, "ignoring server-initiated message");
            continue;
        }
        let Some(id) = response.id else {
            warn!("discarding rpc response without id");
            continue;
        };

        let waiter = lock(&pending).take(id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response.into_result());
            }
            None => debug!(id, "response for unknown request"),
        }
    }

    lock(&pending).fail_all(ConnectivityError::UnexpectedEof);
}

#[async_trait]
impl Channel for JsonRpcChannel {
    async fn call(&self, method: &str, params: JsonValue) -> RpcResult<JsonValue> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let response = {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(ConnectivityError::ChannelClosed.into());
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.insert(id, tx);
            rx
        };

        let message = serde_json::to_string(&RequestFrame {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        })
        .map_err(|e| {
            self.forget(id);
            RpcError::Encode(e.to_string())
        })?;

        let written = {
            let mut writer = self.writer.lock().await;
            writer.send(message).await
        };
        if let Err(err) = written {
            self.forget(id);
            return Err(match err.kind() {
                io::ErrorKind::InvalidInput => RpcError::Encode(err.to_string()),
                _ => {
                    debug!(method, error = %err, "rpc write failed");
                    ConnectivityError::ChannelClosed.into()
                }
            });
        }

        match response.await {
            Ok(result) => result,
            Err(_) => Err(ConnectivityError::UnexpectedEof.into()),
        }
    }

    async fn close(&self) {
        let idle = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            if pending.waiters.is_empty() {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                pending.on_idle = Some(tx);
                Some(rx)
            }
        };

        match idle {
            None => self.writer.lock().await.shutdown().await,
            Some(idle) => {
                debug!("channel closing after in-flight calls settle");
                let writer = self.writer.clone();
                tokio::spawn(async move {
                    // Err: the channel was dropped first; shut down anyway.
                    let _ = idle.await;
                    writer.lock().await.shutdown().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// In-process message pipe: what the channel sends shows up on `requests`,
    /// whatever the test pushes into `responses` is read back.
    struct PipeWriter {
        requests: mpsc::UnboundedSender<JsonValue>,
        shut: Arc<std::sync::atomic::AtomicBool>,
    }

    struct PipeReader {
        responses: mpsc::UnboundedReceiver<JsonValue>,
    }

    #[async_trait]
    impl MessageWriter for PipeWriter {
        async fn send(&mut self, message: String) -> io::Result<()> {
            let value = serde_json::from_str(&message).map_err(io::Error::other)?;
            self.requests
                .send(value)
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }

        async fn shutdown(&mut self) {
            self.shut.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MessageReader for PipeReader {
        async fn recv(&mut self) -> io::Result<Vec<u8>> {
            match self.responses.recv().await {
                Some(value) => Ok(serde_json::to_vec(&value).map_err(io::Error::other)?),
                None => Err(io::ErrorKind::UnexpectedEof.into()),
            }
        }
    }

    struct Server {
        requests: mpsc::UnboundedReceiver<JsonValue>,
        responses: mpsc::UnboundedSender<JsonValue>,
        shut: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Server {
        async fn next_request(&mut self) -> JsonValue {
            self.requests.recv().await.unwrap()
        }

        fn respond(&self, request: &JsonValue, result: JsonValue) {
            let response = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
            self.responses.send(response).unwrap();
        }

        fn writer_shut_down(&self) -> bool {
            self.shut.load(Ordering::SeqCst)
        }
    }

    fn pipe() -> (JsonRpcChannel, Server) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        let shut = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let channel = JsonRpcChannel::new(
            PipeReader { responses: resp_rx },
            PipeWriter {
                requests: req_tx,
                shut: shut.clone(),
            },
        );
        let server = Server {
            requests: req_rx,
            responses: resp_tx,
            shut,
        };
        (channel, server)
    }

    #[tokio::test]
    async fn request_carries_version_id_and_params() {
        let (channel, mut server) = pipe();
        let channel = Arc::new(channel);

        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("notify", json!("42")).await })
        };
        let request = server.next_request().await;
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "notify");
        assert_eq!(request["params"], "42");
        server.respond(&request, json!(true));

        assert_eq!(call.await.unwrap().unwrap(), json!(true));
    }

    #[tokio::test]
    async fn close_lets_in_flight_calls_finish_and_rejects_new_ones() {
        let (channel, mut server) = pipe();
        let channel = Arc::new(channel);

        let in_flight = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("next", JsonValue::Null).await })
        };
        let request = server.next_request().await;

        channel.close().await;
        let err = channel.call("notify", json!("1")).await.unwrap_err();
        assert_eq!(err, RpcError::Connectivity(ConnectivityError::ChannelClosed));
        assert!(!server.writer_shut_down(), "writer stays open while a call waits");

        server.respond(&request, json!({ "id": "p-9" }));
        assert_eq!(in_flight.await.unwrap().unwrap(), json!({ "id": "p-9" }));

        // The idle signal hands the shutdown to a spawned task.
        for _ in 0..10 {
            if server.writer_shut_down() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(server.writer_shut_down());
    }

    #[tokio::test]
    async fn close_without_pending_calls_shuts_the_writer_down_at_once() {
        let (channel, server) = pipe();

        channel.close().await;

        assert!(server.writer_shut_down());
        let err = channel.call("next", JsonValue::Null).await.unwrap_err();
        assert_eq!(err, RpcError::Connectivity(ConnectivityError::ChannelClosed));
    }

    #[tokio::test]
    async fn stream_end_fails_calls_waiting_after_close() {
        let (channel, mut server) = pipe();
        let channel = Arc::new(channel);

        let in_flight = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.call("update", json!({})).await })
        };
        let _ = server.next_request().await;
        channel.close().await;
        drop(server);

        let err = in_flight.await.unwrap().unwrap_err();
        assert_eq!(err, RpcError::Connectivity(ConnectivityError::UnexpectedEof));
    }
}
