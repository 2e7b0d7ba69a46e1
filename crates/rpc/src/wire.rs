//! Method names and request payloads exchanged with the queue server.
//!
//! Field names are part of the compatibility surface.

use base64::Engine;
use serde::{Serialize, Serializer};

use pipeline_core::{Line, State};

pub const METHOD_NEXT: &str = "next";
pub const METHOD_NOTIFY: &str = "notify";
pub const METHOD_EXTEND: &str = "extend";
pub const METHOD_UPDATE: &str = "update";
pub const METHOD_LOG: &str = "log";
pub const METHOD_SAVE: &str = "save";

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRequest<'a> {
    pub id: &'a str,
    pub state: &'a State,
}

#[derive(Debug, Serialize)]
pub(crate) struct LogRequest<'a> {
    pub id: &'a str,
    pub line: &'a Line,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveRequest<'a> {
    pub id: &'a str,
    pub mime: &'a str,
    /// Raw artifact bytes (standard base64 in JSON).
    #[serde(serialize_with = "serialize_base64")]
    pub data: &'a [u8],
}

fn serialize_base64<S>(bytes: &&[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    serializer.serialize_str(&encoded)
}
