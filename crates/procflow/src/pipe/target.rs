//! Destinations for standard output and standard error

use encoding_rs::Encoding;
use futures::future::{BoxFuture, try_join_all};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use super::cancellable;
use super::shared::SharedWriter;
use super::text::LineDecoder;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::Result;

/// Callback invoked once per decoded line, without the line terminator
#[derive(Clone)]
pub enum LineHandler {
    /// Runs inline on the pump
    Sync(Arc<dyn Fn(&str) + Send + Sync>),
    /// The pump waits for the returned future before decoding the next chunk
    Async(Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl LineHandler {
    async fn call(&self, line: String) {
        match self {
            LineHandler::Sync(handler) => handler(&line),
            LineHandler::Async(handler) => handler(line).await,
        }
    }
}

impl fmt::Debug for LineHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineHandler::Sync(_) => f.write_str("Sync(..)"),
            LineHandler::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// Where a child's standard output or standard error goes
#[derive(Clone, Default)]
pub enum Target {
    /// Output is discarded
    #[default]
    Null,
    /// Bytes are written to a shared async writer
    Stream {
        /// The destination writer
        writer: SharedWriter,
        /// Flush after every chunk
        auto_flush: bool,
    },
    /// A file created (or truncated) when the run starts
    File(PathBuf),
    /// Output is decoded as text and handed over line by line
    TextSink {
        /// Encoding used to decode the bytes
        encoding: &'static Encoding,
        /// Receives each line
        handler: LineHandler,
    },
    /// Every member receives the identical byte sequence
    Merge(Vec<Target>),
}

impl Target {
    /// A target that discards everything
    pub fn null() -> Self {
        Target::Null
    }

    /// A target that writes to an async writer
    pub fn stream<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::stream_with_flush(writer, false)
    }

    /// A target that writes to an async writer, optionally flushing every chunk
    pub fn stream_with_flush<W>(writer: W, auto_flush: bool) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Target::Stream {
            writer: SharedWriter::new(writer),
            auto_flush,
        }
    }

    /// A target that writes to a file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Target::File(path.into())
    }

    /// A target that calls `handler` for every UTF-8 decoded line
    pub fn lines<F>(handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::lines_with_encoding(encoding_rs::UTF_8, handler)
    }

    /// A target that calls `handler` for every line decoded with `encoding`
    pub fn lines_with_encoding<F>(encoding: &'static Encoding, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Target::TextSink {
            encoding,
            handler: LineHandler::Sync(Arc::new(handler)),
        }
    }

    /// A target that awaits `handler` for every UTF-8 decoded line
    pub fn lines_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::lines_async_with_encoding(encoding_rs::UTF_8, handler)
    }

    /// A target that awaits `handler` for every line decoded with `encoding`
    pub fn lines_async_with_encoding<F, Fut>(encoding: &'static Encoding, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Target::TextSink {
            encoding,
            handler: LineHandler::Async(Arc::new(move |line: String| -> BoxFuture<'static, ()> {
                Box::pin(handler(line))
            })),
        }
    }

    /// Fan output out to every target.
    ///
    /// Nested merges are flattened and [`Target::Null`] members dropped. A
    /// single remaining member is returned unchanged, none yields `Null`.
    pub fn merge(targets: impl IntoIterator<Item = Target>) -> Self {
        let mut members = Vec::new();
        flatten_into(targets, &mut members);
        match members.len() {
            0 => Target::Null,
            1 => members.remove(0),
            _ => Target::Merge(members),
        }
    }

    /// Returns true if this target discards everything
    pub fn is_null(&self) -> bool {
        matches!(self, Target::Null)
    }

    /// Drain `reader` into this target until EOF.
    ///
    /// For a merge, each chunk is written to all members concurrently and the
    /// next chunk is only read once every member has accepted it.
    pub async fn copy_from(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        cancel: &CancellationToken,
        config: &Config,
    ) -> Result<()> {
        let mut sink = cancellable(cancel, Sink::open(self)).await??;
        let mut buffer = vec![0u8; config.effective_chunk_size()];
        loop {
            let read = cancellable(cancel, reader.read(&mut buffer)).await??;
            if read == 0 {
                break;
            }
            cancellable(cancel, sink.write(&buffer[..read])).await??;
        }
        cancellable(cancel, sink.finish()).await?
    }
}

fn flatten_into(targets: impl IntoIterator<Item = Target>, members: &mut Vec<Target>) {
    for target in targets {
        match target {
            Target::Null => {}
            Target::Merge(inner) => flatten_into(inner, members),
            other => members.push(other),
        }
    }
}

/// A target opened for one run
enum Sink {
    Null,
    Writer { writer: SharedWriter, auto_flush: bool },
    File(async_fs::File),
    Text { decoder: LineDecoder, handler: LineHandler },
    Merge(Vec<Sink>),
}

impl Sink {
    fn open(target: &Target) -> BoxFuture<'_, Result<Sink>> {
        Box::pin(async move {
            let sink = match target {
                Target::Null => Sink::Null,
                Target::Stream { writer, auto_flush } => Sink::Writer {
                    writer: writer.clone(),
                    auto_flush: *auto_flush,
                },
                Target::File(path) => Sink::File(async_fs::File::create(path).await?),
                Target::TextSink { encoding, handler } => Sink::Text {
                    decoder: LineDecoder::new(encoding),
                    handler: handler.clone(),
                },
                Target::Merge(members) => {
                    Sink::Merge(try_join_all(members.iter().map(Sink::open)).await?)
                }
            };
            Ok(sink)
        })
    }

    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self {
                Sink::Null => {}
                Sink::Writer { writer, auto_flush } => {
                    writer.write_chunk(chunk, *auto_flush).await?
                }
                Sink::File(file) => file.write_all(chunk).await?,
                Sink::Text { decoder, handler } => {
                    for line in decoder.push(chunk) {
                        handler.call(line).await;
                    }
                }
                Sink::Merge(members) => {
                    try_join_all(members.iter_mut().map(|member| member.write(chunk))).await?;
                }
            }
            Ok(())
        })
    }

    fn finish(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self {
                Sink::Null => {}
                Sink::Writer { writer, .. } => writer.flush().await?,
                Sink::File(file) => file.flush().await?,
                Sink::Text { decoder, handler } => {
                    for line in decoder.finish() {
                        handler.call(line).await;
                    }
                }
                Sink::Merge(members) => {
                    try_join_all(members.iter_mut().map(Sink::finish)).await?;
                }
            }
            Ok(())
        })
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Null => f.write_str("Null"),
            Target::Stream { writer, auto_flush } => f
                .debug_struct("Stream")
                .field("writer", writer)
                .field("auto_flush", auto_flush)
                .finish(),
            Target::File(path) => f.debug_tuple("File").field(path).finish(),
            Target::TextSink { encoding, handler } => f
                .debug_struct("TextSink")
                .field("encoding", &encoding.name())
                .field("handler", handler)
                .finish(),
            Target::Merge(members) => f.debug_tuple("Merge").field(members).finish(),
        }
    }
}
