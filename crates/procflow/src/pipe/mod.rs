//! Pipe abstraction for process streams
//!
//! A [`Source`] produces the bytes fed to a child's standard input, a
//! [`Target`] consumes bytes read from its standard output or error. Both are
//! closed enums: the pump matches on every variant, so a pipe it cannot drive
//! cannot be constructed.

mod capture;
mod shared;
mod source;
mod target;
pub(crate) mod text;

pub use capture::CaptureBuffer;
pub use shared::{BoxedReader, BoxedWriter, SharedReader, SharedWriter};
pub use source::Source;
pub use target::{LineHandler, Target};

use futures::io::{AsyncRead, AsyncReadExt};
use std::future::Future;

use crate::cancel::{CancellationKind, CancellationToken};
use crate::error::{Error, Result};

/// Run `future` unless `cancel` fires first.
///
/// Forceful cancellation must be able to interrupt a read or write that is
/// already blocked, not just prevent the next one.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output> {
    if cancel.is_cancelled() {
        return Err(pump_cancelled());
    }
    futures_lite::future::or(async { Ok(future.await) }, async {
        cancel.cancelled().await;
        Err(pump_cancelled())
    })
    .await
}

pub(crate) fn pump_cancelled() -> Error {
    Error::Cancelled {
        kind: CancellationKind::Forceful,
        exit_code: None,
        start_time: None,
        exit_time: None,
    }
}

/// Copy `reader` into `destination` chunk by chunk until EOF
pub(crate) async fn copy_reader<R>(
    reader: &mut R,
    destination: &SharedWriter,
    cancel: &CancellationToken,
    chunk_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; chunk_size];
    loop {
        let read = cancellable(cancel, reader.read(&mut buffer)).await??;
        if read == 0 {
            return Ok(());
        }
        cancellable(cancel, destination.write_chunk(&buffer[..read], false)).await??;
    }
}
