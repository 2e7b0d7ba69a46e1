//! Ordered log streaming for one pipeline step.

use tokio::time::Instant;
use tracing::trace;

use pipeline_core::{Line, LineKind};

use crate::error::RpcResult;
use crate::peer::Peer;

/// Streams the output of one step of one pipeline as [`Line`] records.
///
/// Every write waits for the server's acknowledgement before returning and takes
/// `&mut self`, so the records of one step reach the server in order. Each record
/// gets the next line number (`pos`) and the whole seconds elapsed since the
/// writer was created (`time`).
pub struct LineWriter<P> {
    peer: P,
    id: String,
    proc: String,
    pos: i32,
    started: Instant,
}

impl<P: Peer> LineWriter<P> {
    pub fn new(peer: P, id: impl Into<String>, proc: impl Into<String>) -> Self {
        Self {
            peer,
            id: id.into(),
            proc: proc.into(),
            pos: 0,
            started: Instant::now(),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.id
    }

    /// Number of records written so far (saturates at `i32::MAX`).
    pub fn lines_written(&self) -> i32 {
        self.pos
    }

    pub async fn write_line(&mut self, kind: LineKind, out: impl Into<String>) -> RpcResult<()> {
        let time = i64::try_from(self.started.elapsed().as_secs()).unwrap_or(i64::MAX);
        let line = Line::new(kind, self.proc.clone(), out).at(self.pos, time);
        trace!(pipeline = %self.id, pos = self.pos, "streaming log line");

        self.peer.log(&self.id, &line).await?;
        self.pos = self.pos.saturating_add(1);
        Ok(())
    }

    /// Write `text` as one stdout record per line. A trailing newline does not
    /// produce an empty record.
    pub async fn write_stdout(&mut self, text: &str) -> RpcResult<()> {
        for line in text.lines() {
            self.write_line(LineKind::Stdout, line).await?;
        }
        Ok(())
    }

    /// Record the step's exit code.
    pub async fn write_exit_code(&mut self, code: i32) -> RpcResult<()> {
        self.write_line(LineKind::ExitCode, code.to_string()).await
    }

    pub fn into_inner(self) -> P {
        self.peer
    }
}

impl<P> core::fmt::Debug for LineWriter<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LineWriter")
            .field("id", &self.id)
            .field("proc", &self.proc)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::AsyncRead;

    use pipeline_core::{Filter, Pipeline, State};

    use crate::error::{ConnectivityError, RpcError};

    /// Peer double that only records log lines.
    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(String, Line)>>,
        fail: bool,
    }

    #[async_trait]
    impl Peer for Recorder {
        async fn next(&self, _filter: Option<&Filter>) -> RpcResult<Pipeline> {
            Ok(Pipeline::default())
        }

        async fn notify(&self, _id: &str) -> RpcResult<bool> {
            Ok(false)
        }

        async fn extend(&self, _id: &str) -> RpcResult<()> {
            Ok(())
        }

        async fn update(&self, _id: &str, _state: &State) -> RpcResult<()> {
            Ok(())
        }

        async fn log(&self, id: &str, line: &Line) -> RpcResult<()> {
            if self.fail {
                return Err(ConnectivityError::UnexpectedEof.into());
            }
            self.lines.lock().unwrap().push((id.to_string(), line.clone()));
            Ok(())
        }

        async fn save(
            &self,
            _id: &str,
            _mime: &str,
            _artifact: &mut (dyn AsyncRead + Send + Unpin),
        ) -> RpcResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lines_are_numbered_and_timestamped_in_order() {
        let peer = Arc::new(Recorder::default());
        let mut writer = LineWriter::new(peer.clone(), "7", "build");

        writer.write_stdout("cargo build\nok\n").await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        writer.write_exit_code(0).await.unwrap();

        let lines = peer.lines.lock().unwrap().clone();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|(id, line)| id == "7" && line.proc == "build"));
        assert_eq!(
            lines.iter().map(|(_, l)| l.pos).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(lines[1].1.out, "ok");
        assert_eq!(lines[2].1.line_kind().unwrap(), LineKind::ExitCode);
        assert_eq!(lines[2].1.time, 3);
        assert_eq!(writer.lines_written(), 3);
    }

    #[tokio::test]
    async fn position_saturates_instead_of_overflowing() {
        let peer = Arc::new(Recorder::default());
        let mut writer = LineWriter::new(peer.clone(), "7", "soak");
        writer.pos = i32::MAX - 1;

        writer.write_stdout("a\nb\nc").await.unwrap();

        let positions: Vec<_> = peer.lines.lock().unwrap().iter().map(|(_, l)| l.pos).collect();
        assert_eq!(positions, vec![i32::MAX - 1, i32::MAX, i32::MAX]);
        assert_eq!(writer.lines_written(), i32::MAX);
    }

    #[tokio::test]
    async fn failed_write_does_not_advance_the_position() {
        let peer = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut writer = LineWriter::new(peer, "7", "test");

        let err = writer.write_line(LineKind::Stderr, "boom").await.unwrap_err();
        assert!(matches!(err, RpcError::Connectivity(_)));
        assert_eq!(writer.lines_written(), 0);
    }
}
