//! Pipeline execution state snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a pipeline as reported to (or by) the server.
///
/// Timestamps are epoch seconds; `0` means "not set".
///
/// While `exited` is `false`, `exit_code` and `finished` carry no meaning.
/// Consumers must not infer completion from `exit_code` alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub exited: bool,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub started: i64,
    #[serde(default)]
    pub finished: i64,
    #[serde(default)]
    pub error: String,
}

impl State {
    /// State of a pipeline that started at `started` and is still executing.
    pub fn running(started: DateTime<Utc>) -> Self {
        Self {
            started: started.timestamp(),
            ..Self::default()
        }
    }

    /// Mark this state as exited with `exit_code` at `finished`.
    pub fn exited(mut self, exit_code: i32, finished: DateTime<Utc>) -> Self {
        self.exited = true;
        self.exit_code = exit_code;
        self.finished = finished.timestamp();
        self
    }

    /// Attach an error message (e.g. a runtime failure unrelated to the exit code).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.started)
    }

    /// Finish time, only when the pipeline has exited.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if !self.exited {
            return None;
        }
        epoch_to_datetime(self.finished)
    }

    pub fn is_running(&self) -> bool {
        self.started != 0 && !self.exited
    }

    /// `true` only for an exited pipeline with exit code 0 and no error message.
    pub fn succeeded(&self) -> bool {
        self.exited && self.exit_code == 0 && self.error.is_empty()
    }
}

fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        None
    } else {
        DateTime::from_timestamp(secs, 0)
    }
}
