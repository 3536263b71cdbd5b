//! Shared stream handles
//!
//! Pipe values are cloned along with the [`Command`](crate::Command) that holds
//! them, so caller-supplied streams live behind `Arc<Mutex<..>>` and every
//! clone refers to the same underlying stream.

use futures::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use futures::lock::{Mutex, MutexGuard};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Boxed async reader used by stream sources
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed async writer used by stream targets
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A reader that can be shared between clones of a pipe.
///
/// Only one run reads at a time; the position is never rewound.
#[derive(Clone)]
pub struct SharedReader {
    inner: Arc<Mutex<BoxedReader>>,
}

impl SharedReader {
    /// Wrap an async reader
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, BoxedReader> {
        self.inner.lock().await
    }
}

impl fmt::Debug for SharedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedReader").finish_non_exhaustive()
    }
}

/// A writer that can be shared between clones of a pipe.
///
/// Counts the bytes written through it. Once released, further writes fail
/// with [`io::ErrorKind::BrokenPipe`].
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
    written: Arc<AtomicU64>,
}

impl SharedWriter {
    /// Wrap an async writer
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total number of bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Write a whole chunk, optionally flushing afterwards
    pub(crate) async fn write_chunk(&self, chunk: &[u8], flush: bool) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(released)?;
        writer.write_all(chunk).await?;
        if flush {
            writer.flush().await?;
        }
        self.written.fetch_add(chunk.len() as u64, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) async fn flush(&self) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }

    /// Close and drop the underlying writer so the reading end observes EOF
    pub(crate) async fn release(&self) -> io::Result<()> {
        let writer = self.inner.lock().await.take();
        match writer {
            Some(mut writer) => writer.close().await,
            None => Ok(()),
        }
    }
}

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream has been released")
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriter")
            .field("bytes_written", &self.bytes_written())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::CaptureBuffer;

    #[smol_potat::test]
    async fn test_writer_counts_bytes() {
        let buffer = CaptureBuffer::new();
        let writer = SharedWriter::new(buffer.clone());
        writer.write_chunk(b"abc", false).await.unwrap();
        writer.write_chunk(b"de", true).await.unwrap();
        assert_eq!(writer.bytes_written(), 5);
        assert_eq!(buffer.bytes(), b"abcde");
    }

    #[smol_potat::test]
    async fn test_write_after_release_is_broken_pipe() {
        let writer = SharedWriter::new(CaptureBuffer::new());
        writer.release().await.unwrap();
        writer.release().await.unwrap();
        let err = writer.write_chunk(b"x", false).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
