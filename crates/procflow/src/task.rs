//! Awaitable handle for a running command

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::cancel::Cancellation;
use crate::error::Result;

/// A started run whose result has not settled yet.
///
/// The process is already running when a `CommandTask` exists, so its pid is
/// available immediately. Awaiting the task drives the I/O pumps; the run makes
/// no progress while nobody polls it. Dropping the task kills the process.
#[must_use = "the run only makes progress while the task is polled"]
pub struct CommandTask<T> {
    pid: u32,
    start_time: DateTime<Utc>,
    cancellation: Cancellation,
    future: BoxFuture<'static, Result<T>>,
}

impl<T> CommandTask<T> {
    pub(crate) fn new(
        pid: u32,
        start_time: DateTime<Utc>,
        cancellation: Cancellation,
        future: BoxFuture<'static, Result<T>>,
    ) -> Self {
        Self {
            pid,
            start_time,
            cancellation,
            future,
        }
    }

    /// Native process id of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// When the process was started
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Ask the process to stop cooperatively (SIGINT or Ctrl+C).
    ///
    /// The run keeps going; the process is free to ignore the request.
    pub fn interrupt(&self) {
        self.cancellation.graceful.cancel();
    }

    /// Kill the process tree and fail the run with a cancellation error
    pub fn kill(&self) {
        self.cancellation.forceful.cancel();
    }

    /// Transform the settled value, keeping pid and cancellation handles
    pub(crate) fn and_then<U, F>(self, f: F) -> CommandTask<U>
    where
        T: Send + 'static,
        U: 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let future = self.future;
        CommandTask {
            pid: self.pid,
            start_time: self.start_time,
            cancellation: self.cancellation,
            future: Box::pin(async move { f(future.await?) }),
        }
    }
}

impl<T> Future for CommandTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for CommandTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTask")
            .field("pid", &self.pid)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}
