//! In-memory capture of process output

use encoding_rs::Encoding;
use futures::io::AsyncWrite;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use super::shared::SharedWriter;
use super::target::Target;
use super::text::decode_all;

/// A clonable byte buffer that can be used as a [`Target`].
///
/// Clones share the same storage, so a buffer can be attached to a command and
/// read back after the run completes.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// A target that appends everything it receives to this buffer
    pub fn target(&self) -> Target {
        Target::Stream {
            writer: SharedWriter::new(self.clone()),
            auto_flush: false,
        }
    }

    /// Copy of the captured bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Captured bytes decoded as text
    pub fn text(&self, encoding: &'static Encoding) -> String {
        decode_all(encoding, &self.lock())
    }

    /// Number of captured bytes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBuffer").field("len", &self.len()).finish()
    }
}
