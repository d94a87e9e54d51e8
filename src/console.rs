//! Bridges a byte-oriented console endpoint onto line-oriented progress
//! output.
//!
//! [`ConsoleBridge::start`] returns a writable [`ConsoleFile`] for a remote
//! command's stdout and a [`ConsoleSession`] owning the task that forwards
//! complete lines to a [`ProgressSink`]. Partial lines are held back until
//! their terminator arrives, the writer closes or the drain is cancelled;
//! lines consisting solely of a newline are dropped.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::progress::ProgressSink;

/// Bytes buffered between the writer and the draining task.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Entry point for console bridging.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleBridge;

impl ConsoleBridge {
    /// Starts draining a fresh console into `sink` until the returned file is
    /// closed or `cancel` fires.
    #[must_use]
    pub fn start(
        name: impl Into<String>,
        sink: Arc<dyn ProgressSink>,
        cancel: Cancellation,
    ) -> (ConsoleFile, ConsoleSession) {
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let task = tokio::spawn(drain(reader, sink, cancel));
        let file = ConsoleFile {
            name: name.into(),
            writer: Some(writer),
        };
        (file, ConsoleSession { task })
    }
}

/// Writable end of a console.
///
/// Reads always report end of file and the endpoint never claims to be a
/// terminal, so remote commands see a non-interactive console.
#[derive(Debug)]
pub struct ConsoleFile {
    name: String,
    writer: Option<DuplexStream>,
}

impl ConsoleFile {
    /// Name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always `false`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        false
    }

    /// Whether [`ConsoleFile::close`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Closes the writable end. Safe to call more than once; later writes
    /// fail with [`io::ErrorKind::BrokenPipe`].
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(err) = writer.shutdown().await
        {
            debug!(console = %self.name, error = %err, "console shutdown failed");
        }
    }
}

impl AsyncWrite for ConsoleFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "console is closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncRead for ConsoleFile {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Handle on the draining task.
#[derive(Debug)]
pub struct ConsoleSession {
    task: JoinHandle<()>,
}

impl ConsoleSession {
    /// Waits for the draining task to flush and exit. Close the
    /// [`ConsoleFile`] first, or fire the cancellation.
    pub async fn finish(self) {
        if let Err(err) = self.task.await {
            debug!(error = %err, "console drain task ended abnormally");
        }
    }
}

async fn drain(reader: DuplexStream, sink: Arc<dyn ProgressSink>, cancel: Cancellation) {
    let mut reader = BufReader::new(reader);
    let mut pending = Vec::new();
    loop {
        let read = tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                debug!(%reason, held = pending.len(), "console drain stopped");
                break;
            }
            read = reader.read_until(b'\n', &mut pending) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) if pending.ends_with(b"\n") => {
                if let Some(line) = display_line(&pending) {
                    sink.output(&line);
                }
                pending.clear();
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "console read failed");
                break;
            }
        }
    }
    if let Some(line) = display_line(&pending) {
        sink.output(&line);
    }
}

/// Renders one raw line without its terminator; `None` for blank separators
/// and empty fragments.
fn display_line(raw: &[u8]) -> Option<String> {
    if raw.is_empty() || raw == b"\n" || raw == b"\r\n" {
        return None;
    }
    let body = raw.strip_suffix(b"\n").unwrap_or(raw);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    Some(String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use crate::test_support::RecordingSink;
    use rstest::rstest;

    #[rstest]
    #[case(b"hello\n", Some("hello"))]
    #[case(b"windows\r\n", Some("windows"))]
    #[case(b"tail", Some("tail"))]
    #[case(b"\n", None)]
    #[case(b"\r\n", None)]
    #[case(b"", None)]
    fn renders_lines(#[case] raw: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(display_line(raw).as_deref(), expected);
    }

    #[tokio::test]
    async fn reassembles_fragmented_writes() {
        let sink = Arc::new(RecordingSink::default());
        let (mut console, session) =
            ConsoleBridge::start("peer-cli", sink.clone(), Cancellation::never());

        for chunk in ["par", "tial\nsecond ", "line\n", "\n", "tail"] {
            console.write_all(chunk.as_bytes()).await.expect("write chunk");
        }
        console.close().await;
        session.finish().await;

        assert_eq!(sink.outputs(), vec!["partial", "second line", "tail"]);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_writes() {
        let sink = Arc::new(RecordingSink::default());
        let (mut console, session) =
            ConsoleBridge::start("peer-cli", sink.clone(), Cancellation::never());

        console.close().await;
        console.close().await;
        assert!(console.is_closed());
        assert!(!console.is_terminal());

        let err = console.write_all(b"late\n").await.expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        session.finish().await;
        assert!(sink.outputs().is_empty());
    }

    #[tokio::test]
    async fn cancellation_flushes_a_held_partial_line() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, cancel) = cancellation();
        let (mut console, session) = ConsoleBridge::start("peer-cli", sink.clone(), cancel);

        console.write_all(b"partial").await.expect("write");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.cancel();
        session.finish().await;
        console.close().await;

        assert_eq!(sink.outputs(), vec![String::from("partial")]);
    }

    #[tokio::test]
    async fn cancellation_stops_draining() {
        let sink = Arc::new(RecordingSink::default());
        let (handle, cancel) = cancellation();
        let (mut console, session) = ConsoleBridge::start("peer-cli", sink.clone(), cancel);

        handle.cancel();
        session.finish().await;
        console.write_all(b"ignored\n").await.ok();
        console.close().await;

        assert!(sink.outputs().is_empty());
    }

    #[tokio::test]
    async fn reads_report_end_of_file() {
        use tokio::io::AsyncReadExt;

        let (mut console, session) =
            ConsoleBridge::start("peer-cli", Arc::new(RecordingSink::default()), Cancellation::never());
        let mut buf = Vec::new();
        assert_eq!(console.read_to_end(&mut buf).await.expect("read"), 0);
        console.close().await;
        session.finish().await;
    }
}
