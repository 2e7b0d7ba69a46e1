//! Connection manager: owns the single live channel of a session.
//!
//! The closed flag and the current channel live in one cell behind one async
//! mutex. Every read-or-replace of the channel takes that lock, and the dial
//! itself runs while the lock is held, so a concurrent [`ConnectionManager::terminate`]
//! can never interleave with an in-progress dial. Reconnects are therefore
//! serialized: at most one dial is in progress per session.
//!
//! Reconnects triggered by a failed call pass the channel that failed. If the
//! current channel is already a different one (another task reconnected first),
//! it is reused instead of dialing again.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::{ConnectivityError, RpcError, RpcResult};
use crate::transport::{Channel, Dialer, same_channel};

#[derive(Default)]
struct Session {
    channel: Option<Arc<dyn Channel>>,
    closed: bool,
}

/// Maintains one duplex channel to one fixed endpoint.
pub struct ConnectionManager {
    id: Uuid,
    endpoint: String,
    dialer: Arc<dyn Dialer>,
    retry: RetryPolicy,
    session: Mutex<Session>,
    /// Wakes pending backoff waits on terminate.
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a manager without dialing. Use [`establish_with_retry`](Self::establish_with_retry)
    /// to open the first channel.
    pub fn new(endpoint: impl Into<String>, dialer: Arc<dyn Dialer>, retry: RetryPolicy) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id: Uuid::now_v7(),
            endpoint: endpoint.into(),
            dialer,
            retry,
            session: Mutex::new(Session::default()),
            shutdown,
        }
    }

    /// Identifier attached to every log record of this session.
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn is_closed(&self) -> bool {
        self.session.lock().await.closed
    }

    /// `true` while a channel is installed and the session is open.
    ///
    /// A channel that failed a call is dropped once a reconnect gives up on it;
    /// a peer that vanished without any call noticing is still reported here.
    pub async fn is_connected(&self) -> bool {
        let session = self.session.lock().await;
        !session.closed && session.channel.is_some()
    }

    /// Dial the endpoint and install the result as the current channel.
    ///
    /// Fails with [`RpcError::Closed`] without dialing once the session is terminated.
    pub async fn establish(&self) -> RpcResult<()> {
        let mut session = self.session.lock().await;
        self.dial_locked(&mut session).await.map(|_| ())
    }

    /// [`establish`](Self::establish) up to the retry budget, waiting `backoff`
    /// after every failed dial.
    ///
    /// Returns `Ok(())` when the budget runs out without a terminal error; the
    /// session is then left without a usable channel and the next call reports a
    /// connectivity error.
    pub async fn establish_with_retry(&self) -> RpcResult<()> {
        self.retry_loop(None, true).await.map(|_| ())
    }

    /// Replace `stale` (the channel a call just failed on) with a working channel.
    ///
    /// Returns the new current channel, or `None` when the retry budget ran out.
    pub(crate) async fn reconnect(
        &self,
        stale: Option<&Arc<dyn Channel>>,
    ) -> RpcResult<Option<Arc<dyn Channel>>> {
        self.retry_loop(stale, false).await
    }

    /// The current channel.
    ///
    /// `Closed` after terminate; `ChannelClosed` when no channel has been
    /// established (e.g. the retry budget ran out).
    pub async fn current(&self) -> RpcResult<Arc<dyn Channel>> {
        let session = self.session.lock().await;
        if session.closed {
            return Err(RpcError::Closed);
        }
        session
            .channel
            .clone()
            .ok_or(RpcError::Connectivity(ConnectivityError::ChannelClosed))
    }

    /// Close the session for good and release the current channel.
    ///
    /// Idempotent. Calls already waiting on the network finish on their own;
    /// every later connect or call fails with [`RpcError::Closed`].
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn terminate(&self) {
        // Interrupt backoff waits before queueing behind a dial in progress.
        self.shutdown.send_replace(true);

        let channel = {
            let mut session = self.session.lock().await;
            if !session.closed {
                info!(endpoint = %self.endpoint, "session terminated");
            }
            session.closed = true;
            session.channel.take()
        };

        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    #[instrument(skip(self, stale), fields(session = %self.id, endpoint = %self.endpoint), err)]
    async fn retry_loop(
        &self,
        stale: Option<&Arc<dyn Channel>>,
        force: bool,
    ) -> RpcResult<Option<Arc<dyn Channel>>> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            if !self.retry.allows(attempt) {
                // Exhaustion is not an error; callers see the missing channel.
                warn!(attempts = attempt - 1, "retry budget exhausted without a connection");
                if let Some(stale) = stale {
                    self.discard(stale).await;
                }
                return Ok(None);
            }

            match self.connect(stale, force).await {
                Ok(channel) => {
                    if attempt > 1 {
                        info!(attempt, "connection re-established");
                    }
                    return Ok(Some(channel));
                }
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, backoff = ?self.retry.backoff, "connect attempt failed");
                    if self.retry.allows(attempt.saturating_add(1)) {
                        self.backoff().await;
                    }
                }
            }
        }
    }

    async fn connect(
        &self,
        stale: Option<&Arc<dyn Channel>>,
        force: bool,
    ) -> RpcResult<Arc<dyn Channel>> {
        let mut session = self.session.lock().await;

        if !force && !session.closed {
            if let Some(current) = &session.channel {
                let replaced = stale.is_none_or(|stale| !same_channel(current, stale));
                if replaced {
                    debug!(session = %self.id, "reusing channel established by another caller");
                    return Ok(current.clone());
                }
            }
        }

        self.dial_locked(&mut session).await
    }

    async fn dial_locked(&self, session: &mut Session) -> RpcResult<Arc<dyn Channel>> {
        if session.closed {
            return Err(RpcError::Closed);
        }

        let channel = self.dialer.dial(&self.endpoint).await?;
        debug!(session = %self.id, endpoint = %self.endpoint, "channel established");

        if let Some(previous) = session.channel.replace(channel.clone()) {
            previous.close().await;
        }
        Ok(channel)
    }

    /// Drop `stale` if it is still the current channel.
    async fn discard(&self, stale: &Arc<dyn Channel>) {
        let removed = {
            let mut session = self.session.lock().await;
            match &session.channel {
                Some(current) if same_channel(current, stale) => session.channel.take(),
                _ => None,
            }
        };
        if let Some(channel) = removed {
            debug!(session = %self.id, "dropping channel that could not be replaced");
            channel.close().await;
        }
    }

    async fn backoff(&self) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.retry.backoff) => {}
            _ = shutdown.wait_for(|closed| *closed) => {
                debug!(session = %self.id, "backoff interrupted by terminate");
            }
        }
    }
}

impl core::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
