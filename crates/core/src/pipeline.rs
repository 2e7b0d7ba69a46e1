//! Unit of queued work handed to a worker.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ModelError, ModelResult};
use crate::state::State;

/// Backend configuration carried with a pipeline.
///
/// Opaque to the session layer; the execution backend decodes it into its own
/// shape with [`BackendConfig::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendConfig(JsonValue);

impl BackendConfig {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_json(self) -> JsonValue {
        self.0
    }

    /// Decode the configuration into a backend-specific type.
    pub fn decode<T: DeserializeOwned>(&self) -> ModelResult<T> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| ModelError::invalid_config(e.to_string()))
    }
}

impl From<JsonValue> for BackendConfig {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// One pipeline handed to this worker by `next`.
///
/// The `id` is issued by the server and stays stable for the lifetime of the
/// pipeline; every follow-up call (`update`, `log`, `save`, ...) refers to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub config: Option<BackendConfig>,
    /// Execution timeout in seconds (`0` = server default).
    #[serde(default)]
    pub timeout: i64,
}

impl Pipeline {
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
