//! `pipeline-core` — value types exchanged with the queue server.
//!
//! This crate contains **plain data** only (no transport or session concerns).
//! Field names are part of the wire contract and must not be renamed.

pub mod error;
pub mod filter;
pub mod line;
pub mod pipeline;
pub mod state;

pub use error::{ModelError, ModelResult};
pub use filter::Filter;
pub use line::{Line, LineKind};
pub use pipeline::{BackendConfig, Pipeline};
pub use state::State;
