//! Queue-server client: the [`Peer`] operations over a resilient session.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::IgnoredAny;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use pipeline_core::{Filter, Line, Pipeline, State};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::{RpcError, RpcResult};
use crate::invoker::Invoker;
use crate::peer::Peer;
use crate::transport::{Dialer, EndpointDialer};
use crate::wire::{
    LogRequest, METHOD_EXTEND, METHOD_LOG, METHOD_NEXT, METHOD_NOTIFY, METHOD_SAVE, METHOD_UPDATE,
    SaveRequest, UpdateRequest,
};

/// A worker's session with the queue server.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and may be
/// called from many tasks at once.
#[derive(Debug)]
pub struct Client {
    connection: Arc<ConnectionManager>,
    invoker: Invoker,
}

impl Client {
    /// Open a session, dialing with the configured retry policy.
    ///
    /// An endpoint `dialer` can never reach fails at once with
    /// [`RpcError::InvalidEndpoint`]. When the retry budget runs out the client is
    /// still returned; its calls then start by reconnecting.
    pub async fn connect(config: ClientConfig, dialer: Arc<dyn Dialer>) -> RpcResult<Self> {
        dialer.check_endpoint(&config.endpoint)?;

        let connection = Arc::new(ConnectionManager::new(config.endpoint, dialer, config.retry));
        connection.establish_with_retry().await?;
        info!(
            session = %connection.session_id(),
            endpoint = %connection.endpoint(),
            connected = connection.is_connected().await,
            "client session opened"
        );

        Ok(Self {
            invoker: Invoker::new(connection.clone()),
            connection,
        })
    }

    /// [`connect`](Self::connect) with the transport chosen by the endpoint scheme:
    /// websocket for `ws://`, length-prefixed TCP for `tcp://` and `host:port`.
    pub async fn connect_endpoint(config: ClientConfig) -> RpcResult<Self> {
        Self::connect(config, Arc::new(EndpointDialer::new())).await
    }

    pub fn session_id(&self) -> Uuid {
        self.connection.session_id()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Shut the session down. Idempotent; later calls fail with [`RpcError::Closed`].
    pub async fn close(&self) {
        self.connection.terminate().await;
    }
}

#[async_trait]
impl Peer for Client {
    #[instrument(skip(self, filter), fields(session = %self.session_id()))]
    async fn next(&self, filter: Option<&Filter>) -> RpcResult<Pipeline> {
        let pipeline: Pipeline = self.invoker.call(METHOD_NEXT, &filter).await?;
        debug!(pipeline = %pipeline.id, "pipeline received");
        Ok(pipeline)
    }

    #[instrument(skip(self), fields(session = %self.session_id()))]
    async fn notify(&self, id: &str) -> RpcResult<bool> {
        self.invoker.call(METHOD_NOTIFY, id).await
    }

    #[instrument(skip(self), fields(session = %self.session_id()))]
    async fn extend(&self, id: &str) -> RpcResult<()> {
        let _: IgnoredAny = self.invoker.call(METHOD_EXTEND, id).await?;
        Ok(())
    }

    #[instrument(skip(self, state), fields(session = %self.session_id(), exited = state.exited))]
    async fn update(&self, id: &str, state: &State) -> RpcResult<()> {
        let _: IgnoredAny = self
            .invoker
            .call(METHOD_UPDATE, &UpdateRequest { id, state })
            .await?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, line), fields(session = %self.session_id(), pos = line.pos))]
    async fn log(&self, id: &str, line: &Line) -> RpcResult<()> {
        let _: IgnoredAny = self
            .invoker
            .call(METHOD_LOG, &LogRequest { id, line })
            .await?;
        Ok(())
    }

    #[instrument(skip(self, artifact), fields(session = %self.session_id()))]
    async fn save(
        &self,
        id: &str,
        mime: &str,
        artifact: &mut (dyn AsyncRead + Send + Unpin),
    ) -> RpcResult<()> {
        let mut data = Vec::new();
        artifact
            .read_to_end(&mut data)
            .await
            .map_err(|e| RpcError::Io(e.to_string()))?;
        debug!(bytes = data.len(), "artifact buffered");

        let _: IgnoredAny = self
            .invoker
            .call(METHOD_SAVE, &SaveRequest { id, mime, data: &data })
            .await?;
        Ok(())
    }
}
