//! Log records streamed from a running pipeline.
//!
//! The session layer never inspects a [`Line`]; it is carried to the server
//! exactly as the caller built it.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Kind of a log record (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Stdout,
    Stderr,
    ExitCode,
    Metadata,
    Progress,
}

impl LineKind {
    pub fn code(self) -> i32 {
        match self {
            LineKind::Stdout => 0,
            LineKind::Stderr => 1,
            LineKind::ExitCode => 2,
            LineKind::Metadata => 3,
            LineKind::Progress => 4,
        }
    }
}

impl TryFrom<i32> for LineKind {
    type Error = ModelError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LineKind::Stdout),
            1 => Ok(LineKind::Stderr),
            2 => Ok(LineKind::ExitCode),
            3 => Ok(LineKind::Metadata),
            4 => Ok(LineKind::Progress),
            other => Err(ModelError::UnknownLineKind(other)),
        }
    }
}

/// One log record.
///
/// `kind` is kept as the raw wire code so that records produced by newer
/// peers pass through unchanged; use [`Line::line_kind`] to interpret it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Name of the step that produced the output.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proc: String,
    /// Seconds elapsed since the step started.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub time: i64,
    #[serde(rename = "type", default)]
    pub kind: i32,
    /// Line number within the step output.
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub pos: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub out: String,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

impl Line {
    pub fn new(kind: LineKind, proc: impl Into<String>, out: impl Into<String>) -> Self {
        Self {
            proc: proc.into(),
            kind: kind.code(),
            out: out.into(),
            ..Self::default()
        }
    }

    pub fn stdout(proc: impl Into<String>, out: impl Into<String>) -> Self {
        Self::new(LineKind::Stdout, proc, out)
    }

    pub fn stderr(proc: impl Into<String>, out: impl Into<String>) -> Self {
        Self::new(LineKind::Stderr, proc, out)
    }

    pub fn at(mut self, pos: i32, time: i64) -> Self {
        self.pos = pos;
        self.time = time;
        self
    }

    pub fn line_kind(&self) -> ModelResult<LineKind> {
        LineKind::try_from(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_fields_are_omitted_on_the_wire() {
        let line = Line::stdout("", "");
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json, serde_json::json!({ "type": 0 }));
    }

    #[test]
    fn populated_line_uses_wire_names() {
        let line = Line::stderr("build", "error: boom").at(12, 3);
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "proc": "build",
                "time": 3,
                "type": 1,
                "pos": 12,
                "out": "error: boom",
            })
        );
    }

    #[test]
    fn unknown_kind_passes_through_but_does_not_interpret() {
        let line: Line = serde_json::from_str(r#"{"type": 42, "out": "x"}"#).unwrap();
        assert_eq!(line.kind, 42);
        assert_eq!(line.line_kind(), Err(ModelError::UnknownLineKind(42)));

        let back = serde_json::to_value(&line).unwrap();
        assert_eq!(back["type"], 42);
    }

    proptest! {
        #[test]
        fn known_codes_map_back_to_themselves(code in 0i32..5) {
            let kind = LineKind::try_from(code).unwrap();
            prop_assert_eq!(kind.code(), code);
        }
    }
}
