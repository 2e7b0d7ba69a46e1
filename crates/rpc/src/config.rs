//! Session configuration.

use std::time::Duration;

use thiserror::Error;

use crate::transport::Endpoint;

/// Default wait between failed connection attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Environment variable holding the server endpoint.
pub const ENV_ENDPOINT: &str = "PIPELINE_RPC_ENDPOINT";
/// Environment variable holding the maximum number of dial attempts (`0` or unset = unbounded).
pub const ENV_MAX_ATTEMPTS: &str = "PIPELINE_RPC_MAX_ATTEMPTS";
/// Environment variable holding the backoff in milliseconds.
pub const ENV_BACKOFF_MS: &str = "PIPELINE_RPC_BACKOFF_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PIPELINE_RPC_ENDPOINT is not set")]
    MissingEndpoint,

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// How many times to dial, and how long to wait between failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until a dial succeeds or the session is closed.
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    pub fn limited(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Whether the 1-based `attempt` is within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Configuration of one session against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address, e.g. `tcp://queue.internal:9000`.
    pub endpoint: String,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_unbounded_retries(mut self) -> Self {
        self.retry.max_attempts = None;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry.backoff = backoff;
        self
    }

    /// Build a config from `PIPELINE_RPC_*` environment variables.
    ///
    /// The endpoint must be `ws://`, `tcp://` or `host:port`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_ENDPOINT)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;

        let endpoint = endpoint.trim();
        Endpoint::parse(endpoint).map_err(|_| ConfigError::Invalid {
            var: ENV_ENDPOINT,
            value: endpoint.to_string(),
        })?;

        let mut config = Self::new(endpoint);

        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS) {
            let attempts: u32 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_MAX_ATTEMPTS,
                value: raw.clone(),
            })?;
            config.retry.max_attempts = (attempts > 0).then_some(attempts);
        }

        if let Some(raw) = lookup(ENV_BACKOFF_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_BACKOFF_MS,
                value: raw.clone(),
            })?;
            config.retry.backoff = Duration::from_millis(millis);
        }

        Ok(config)
    }
}
