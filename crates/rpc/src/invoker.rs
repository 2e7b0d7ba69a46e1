//! Call invoker: one named call, at most one replay.
//!
//! A call that fails because the channel died (closed, or the stream ended
//! mid-call) triggers a reconnect and is reissued exactly once on the new
//! channel. Whatever the replay yields is returned as-is; there is no second
//! round. Every other failure is returned untouched without reconnecting.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use crate::connection::ConnectionManager;
use crate::error::{RpcError, RpcResult};

/// Issues calls over the current channel of a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct Invoker {
    connection: Arc<ConnectionManager>,
}

impl Invoker {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Typed call: serialize `request`, decode the response into `Res`.
    ///
    /// Use [`serde::de::IgnoredAny`] as `Res` for calls without a response.
    pub async fn call<Req, Res>(&self, method: &str, request: &Req) -> RpcResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let params =
            serde_json::to_value(request).map_err(|e| RpcError::Encode(e.to_string()))?;
        let response = self.call_raw(method, params).await?;
        serde_json::from_value(response).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }

    /// Untyped call with the reconnect-and-replay-once policy.
    #[instrument(skip(self, params), fields(session = %self.connection.session_id()))]
    pub async fn call_raw(&self, method: &str, params: JsonValue) -> RpcResult<JsonValue> {
        let stale = match self.connection.current().await {
            Ok(channel) => match channel.call(method, params.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if !err.is_connectivity() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "call failed on a dead channel; reconnecting");
                    Some(channel)
                }
            },
            Err(err) if err.is_connectivity() => {
                debug!("no channel established; reconnecting before the call");
                None
            }
            Err(err) => return Err(err),
        };

        let channel = match self.connection.reconnect(stale.as_ref()).await? {
            Some(channel) => channel,
            None => self.connection.current().await?,
        };

        debug!("replaying call on the new channel");
        channel.call(method, params).await
    }
}
