//! Capability surface offered to worker logic.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use pipeline_core::{Filter, Line, Pipeline, State};

use crate::error::RpcResult;

/// What a worker can ask of the queue server.
///
/// [`Client`](crate::Client) implements this over a resilient session. Test
/// doubles can implement it directly without any transport.
///
/// ## Ordering
///
/// No ordering is guaranteed across concurrent callers. Calls whose order matters
/// on the server (notably repeated [`log`](Peer::log) calls for one pipeline) must
/// be issued sequentially by the caller; see [`LineWriter`](crate::LineWriter).
#[async_trait]
pub trait Peer: Send + Sync {
    /// Wait for the next pipeline matching `filter` and take ownership of it.
    async fn next(&self, filter: Option<&Filter>) -> RpcResult<Pipeline>;

    /// Returns `true` if the pipeline must be aborted.
    async fn notify(&self, id: &str) -> RpcResult<bool>;

    /// Push back the pipeline's execution deadline.
    async fn extend(&self, id: &str) -> RpcResult<()>;

    /// Report a state transition. Safe to repeat; the server applies it idempotently.
    async fn update(&self, id: &str, state: &State) -> RpcResult<()>;

    /// Append one log record.
    async fn log(&self, id: &str, line: &Line) -> RpcResult<()>;

    /// Upload an artifact.
    ///
    /// The whole `artifact` is read into memory before the call is made and sent
    /// as one base64-encoded request, so its size is bounded by memory. Requests
    /// are never capped by the bundled transports, except that a length-prefixed
    /// TCP frame holds at most 4 GiB of JSON (an artifact of about 3 GiB). The
    /// server may enforce a lower limit, reported as [`RpcError::Application`](crate::RpcError::Application).
    async fn save(
        &self,
        id: &str,
        mime: &str,
        artifact: &mut (dyn AsyncRead + Send + Unpin),
    ) -> RpcResult<()>;
}

#[async_trait]
impl<P> Peer for Arc<P>
where
    P: Peer + ?Sized,
{
    async fn next(&self, filter: Option<&Filter>) -> RpcResult<Pipeline> {
        (**self).next(filter).await
    }

    async fn notify(&self, id: &str) -> RpcResult<bool> {
        (**self).notify(id).await
    }

    async fn extend(&self, id: &str) -> RpcResult<()> {
        (**self).extend(id).await
    }

    async fn update(&self, id: &str, state: &State) -> RpcResult<()> {
        (**self).update(id, state).await
    }

    async fn log(&self, id: &str, line: &Line) -> RpcResult<()> {
        (**self).log(id, line).await
    }

    async fn save(
        &self,
        id: &str,
        mime: &str,
        artifact: &mut (dyn AsyncRead + Send + Unpin),
    ) -> RpcResult<()> {
        (**self).save(id, mime, artifact).await
    }
}
