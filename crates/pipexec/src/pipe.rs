// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory pipe connecting adjacent pipeline stages.
//!
//! The pipe is unbounded: stages are started lazily while waiting, so a
//! producer may finish before its consumer exists.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

use crate::stdio::SharedWriter;

/// Create a connected reader/writer pair.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
        },
        PipeWriter { tx: Some(tx) },
    )
}

/// Read half of a [`pipe`]. Reports end of stream once the writer is shut
/// down or dropped and all buffered bytes were consumed.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.pos < self.chunk.len() {
                let n = buf.remaining().min(self.chunk.len() - self.pos);
                let start = self.pos;
                buf.put_slice(&self.chunk[start..start + n]);
                self.pos += n;
                return Poll::Ready(Ok(()));
            }
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Write half of a [`pipe`]. Writing after the reader is gone fails with
/// [`io::ErrorKind::BrokenPipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let Some(tx) = self.tx.as_ref() else {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on closed pipe",
            )));
        };
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        match tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => {
                self.tx = None;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "read end of pipe closed",
                )))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.take();
        Poll::Ready(Ok(()))
    }
}

/// Closes the write end feeding the next stage once this stage is done.
#[derive(Debug, Default)]
pub(crate) struct Closer {
    writer: Option<SharedWriter>,
}

impl Closer {
    pub(crate) fn new(writer: SharedWriter) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Shut the writer down. Subsequent calls are no-ops.
    pub(crate) async fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        // Still open: the wait that owned it never finished.
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = writer.shutdown().await {
                    warn!(target: "pipexec", error = %err, "failed to close pipe");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn reader_sees_eof_after_close() {
        let (mut reader, writer) = pipe();
        let shared = SharedWriter::new(writer);
        let mut closer = Closer::new(shared.clone());
        shared.write_all(b"a\nb\n").await.unwrap();
        closer.close().await.unwrap();

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "a\nb\n");
    }

    #[tokio::test]
    async fn close_twice_is_ok() {
        let (_reader, writer) = pipe();
        let mut closer = Closer::new(SharedWriter::new(writer));
        closer.close().await.unwrap();
        closer.close().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_open_closer_still_ends_stream() {
        let (mut reader, writer) = pipe();
        let shared = SharedWriter::new(writer);
        shared.write_all(b"partial").await.unwrap();
        drop(Closer::new(shared.clone()));

        let mut out = String::new();
        tokio::time::timeout(std::time::Duration::from_secs(5), reader.read_to_string(&mut out))
            .await
            .expect("reader should see end of stream")
            .unwrap();
        assert_eq!(out, "partial");
        assert_eq!(
            shared.write_all(b"late").await.unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    #[tokio::test]
    async fn write_after_reader_drop_is_broken_pipe() {
        let (reader, mut writer) = pipe();
        drop(reader);
        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn small_reads_drain_large_chunk() {
        let (mut reader, mut writer) = pipe();
        writer.write_all(b"abcdef").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut two = [0u8; 2];
        reader.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"ab");
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"cdef");
    }
}
