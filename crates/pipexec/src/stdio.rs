// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard stream bindings for a command.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Boxed byte source feeding a process's standard input.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed byte sink receiving a process's output.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a process reads its standard input from.
#[derive(Default)]
pub enum Input {
    /// The null device.
    #[default]
    Null,
    /// The parent's standard input.
    Inherit,
    /// Bytes copied from a reader until it reports end of stream.
    Reader(BoxedReader),
}

impl Input {
    /// Feed the process from `reader`.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Input::Reader(Box::new(reader))
    }

    /// Feed the process a fixed byte string.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Input::reader(io::Cursor::new(bytes.into()))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Null => f.write_str("Null"),
            Input::Inherit => f.write_str("Inherit"),
            Input::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// A writer that can be shared by several producers.
///
/// Pipeline stages share the caller's stderr sink, so writes go through an
/// async mutex and are never interleaved within a single chunk.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<tokio::sync::Mutex<BoxedWriter>>,
}

impl SharedWriter {
    /// Wrap `writer`.
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
        }
    }

    /// Write the whole buffer.
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.lock().await.write_all(buf).await
    }

    /// Flush buffered data.
    pub async fn flush(&self) -> io::Result<()> {
        self.inner.lock().await.flush().await
    }

    /// Shut down the underlying writer.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedWriter(..)")
    }
}

/// Where a process's standard output or error goes.
#[derive(Clone, Debug, Default)]
pub enum Output {
    /// The null device.
    #[default]
    Null,
    /// The parent's corresponding stream.
    Inherit,
    /// Bytes copied into a shared writer.
    Writer(SharedWriter),
}

impl Output {
    /// Send the stream into `writer`.
    pub fn writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Output::Writer(SharedWriter::new(writer))
    }
}

impl From<SharedWriter> for Output {
    fn from(writer: SharedWriter) -> Self {
        Output::Writer(writer)
    }
}

impl From<SharedBuffer> for Output {
    fn from(buffer: SharedBuffer) -> Self {
        Output::writer(buffer)
    }
}

/// Clonable in-memory byte buffer usable as an output sink.
///
/// Clones share storage: hand a clone to the command, keep one to read back
/// what was written.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents decoded as UTF-8, lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Copy of the raw bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes.
    pub fn extend_from_slice(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .finish()
    }
}
