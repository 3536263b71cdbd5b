//! Sources of standard input

use encoding_rs::Encoding;
use futures::future::BoxFuture;
use futures::io::AsyncRead;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::shared::{SharedReader, SharedWriter};
use super::target::Target;
use super::{cancellable, copy_reader};
use crate::cancel::{Cancellation, CancellationToken};
use crate::command::Command;
use crate::config::Config;
use crate::error::Result;

/// Where a child's standard input comes from
#[derive(Clone, Default)]
pub enum Source {
    /// Input is closed immediately
    #[default]
    Null,
    /// A fixed byte buffer
    Bytes(Arc<[u8]>),
    /// An async reader shared with the caller; never rewound
    Stream(SharedReader),
    /// A file opened when the run starts
    File(PathBuf),
    /// The standard output of another command, which runs alongside this one
    Command(Box<Command>),
}

impl Source {
    /// A source that provides no input
    pub fn null() -> Self {
        Source::Null
    }

    /// A source that provides the given bytes
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Source::Bytes(Arc::from(data.into()))
    }

    /// A source that provides UTF-8 encoded text
    pub fn text(text: impl AsRef<str>) -> Self {
        Source::bytes(text.as_ref().as_bytes())
    }

    /// A source that provides text in the given encoding
    pub fn text_with_encoding(text: impl AsRef<str>, encoding: &'static Encoding) -> Self {
        let (bytes, _, _) = encoding.encode(text.as_ref());
        Source::bytes(bytes.into_owned())
    }

    /// A source that reads from an async reader
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Source::Stream(SharedReader::new(reader))
    }

    /// A source that reads a file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File(path.into())
    }

    /// A source fed by another command's standard output
    pub fn command(command: Command) -> Self {
        Source::Command(Box::new(command))
    }

    /// Returns true if this source provides no input
    pub fn is_null(&self) -> bool {
        matches!(self, Source::Null)
    }

    /// Copy this source into `destination` until it is exhausted.
    ///
    /// Returns the number of bytes that reached `destination`. The destination
    /// is not closed; that is up to the caller.
    pub async fn copy_to(
        &self,
        destination: &SharedWriter,
        cancel: &CancellationToken,
        config: &Config,
    ) -> Result<u64> {
        let before = destination.bytes_written();
        let chunk_size = config.effective_chunk_size();

        match self {
            Source::Null => {}
            Source::Bytes(data) => {
                for chunk in data.chunks(chunk_size) {
                    cancellable(cancel, destination.write_chunk(chunk, false)).await??;
                }
                cancellable(cancel, destination.flush()).await??;
            }
            Source::Stream(reader) => {
                let mut reader = cancellable(cancel, reader.lock()).await?;
                copy_reader(&mut **reader, destination, cancel, chunk_size).await?;
                cancellable(cancel, destination.flush()).await??;
            }
            Source::File(path) => {
                let mut file = cancellable(cancel, async_fs::File::open(path)).await??;
                copy_reader(&mut file, destination, cancel, chunk_size).await?;
                cancellable(cancel, destination.flush()).await??;
            }
            Source::Command(upstream) => {
                pipe_from_command(upstream, destination, cancel).await?;
            }
        }

        Ok(destination.bytes_written() - before)
    }
}

/// Run `upstream` with its standard output also flowing into `destination`.
///
/// The upstream run is tied to `cancel`, so stopping this side kills the
/// producer instead of leaving it blocked on a full pipe.
fn pipe_from_command<'a>(
    upstream: &'a Command,
    destination: &'a SharedWriter,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let stdout = Target::merge([
            upstream.stdout().clone(),
            Target::Stream {
                writer: destination.clone(),
                auto_flush: true,
            },
        ]);
        let task = upstream
            .clone()
            .with_stdout(stdout)
            .execute_with(Cancellation::forceful(cancel.clone()))?;
        debug!(pid = task.pid(), "upstream command started");
        let result = task.await?;
        debug!(exit_code = result.exit_code, "upstream command finished");
        Ok(())
    })
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::bytes(data)
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::text(text)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::bytes(text.into_bytes())
    }
}

impl From<Command> for Source {
    fn from(command: Command) -> Self {
        Source::command(command)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Null => f.write_str("Null"),
            Source::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Source::Stream(reader) => f.debug_tuple("Stream").field(reader).finish(),
            Source::File(path) => f.debug_tuple("File").field(path).finish(),
            Source::Command(command) => {
                f.debug_tuple("Command").field(&command.to_string()).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::CaptureBuffer;

    #[smol_potat::test]
    async fn test_null_source_copies_nothing() {
        let buffer = CaptureBuffer::new();
        let writer = SharedWriter::new(buffer.clone());
        let copied = Source::null()
            .copy_to(&writer, &CancellationToken::new(), &Config::default())
            .await
            .unwrap();
        assert_eq!(copied, 0);
        assert!(buffer.is_empty());
    }

    #[smol_potat::test]
    async fn test_bytes_source_respects_chunk_size() {
        let buffer = CaptureBuffer::new();
        let writer = SharedWriter::new(buffer.clone());
        let config = Config::default().with_chunk_size(3);
        let copied = Source::text("hello world")
            .copy_to(&writer, &CancellationToken::new(), &config)
            .await
            .unwrap();
        assert_eq!(copied, 11);
        assert_eq!(buffer.bytes(), b"hello world");
    }

    #[smol_potat::test]
    async fn test_stream_source_is_not_rewound() {
        let source = Source::stream(futures::io::Cursor::new(b"once".to_vec()));
        let config = Config::default();
        let token = CancellationToken::new();

        let first = CaptureBuffer::new();
        source.copy_to(&SharedWriter::new(first.clone()), &token, &config).await.unwrap();
        let second = CaptureBuffer::new();
        source.copy_to(&SharedWriter::new(second.clone()), &token, &config).await.unwrap();

        assert_eq!(first.bytes(), b"once");
        assert!(second.is_empty());
    }

    #[smol_potat::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, b"from file").unwrap();

        let buffer = CaptureBuffer::new();
        Source::file(&path)
            .copy_to(
                &SharedWriter::new(buffer.clone()),
                &CancellationToken::new(),
                &Config::default(),
            )
            .await
            .unwrap();
        assert_eq!(buffer.bytes(), b"from file");
    }

    #[smol_potat::test]
    async fn test_cancelled_source_stops() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Source::text("data")
            .copy_to(&SharedWriter::new(CaptureBuffer::new()), &token, &Config::default())
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_text_with_encoding() {
        match Source::text_with_encoding("é", encoding_rs::WINDOWS_1252) {
            Source::Bytes(data) => assert_eq!(&*data, &[0xe9]),
            other => panic!("unexpected source {other:?}"),
        }
    }
}
