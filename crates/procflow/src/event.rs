//! Live event streams
//!
//! Both delivery modes run the command with text sinks merged onto its own
//! stdout and stderr targets, so the configured targets keep receiving the
//! raw bytes.
//!
//! - **Pull** ([`Command::listen`]) returns an [`EventStream`]. Line events go
//!   through a channel of capacity one and the pump waits for each send, so
//!   the process is only read as fast as the stream is consumed.
//! - **Push** ([`Command::observe`]) returns an [`Observation`] whose receiver
//!   is unbounded. Events queue up instead of stalling the child.
//!
//! Order is preserved per stream; stdout and stderr lines interleave in
//! whatever order the pumps decode them.

use async_channel::{Receiver, Sender};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::cancel::Cancellation;
use crate::command::Command;
use crate::error::Result;
use crate::options::Validation;
use crate::pipe::Target;
use crate::result::CommandResult;
use crate::task::CommandTask;

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandEvent {
    /// The process has started; always the first event
    Started {
        /// Native process id
        pid: u32,
    },
    /// A line written to standard output
    StandardOutputLine {
        /// Line text without its terminator
        text: String,
    },
    /// A line written to standard error
    StandardErrorLine {
        /// Line text without its terminator
        text: String,
    },
    /// The process has exited and all output was delivered; always the last event
    Exited {
        /// Exit code of the process
        exit_code: i32,
    },
}

impl fmt::Display for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEvent::Started { pid } => write!(f, "started (pid {pid})"),
            CommandEvent::StandardOutputLine { text } => write!(f, "out> {text}"),
            CommandEvent::StandardErrorLine { text } => write!(f, "err> {text}"),
            CommandEvent::Exited { exit_code } => write!(f, "exited ({exit_code})"),
        }
    }
}

impl Command {
    /// Run the command as a pull-mode event stream
    pub fn listen(&self) -> Result<EventStream> {
        self.listen_with(Cancellation::default())
    }

    /// Run the command as a pull-mode event stream with cancellation.
    ///
    /// Exit code validation does not apply; a non-zero exit is reported as
    /// [`CommandEvent::Exited`].
    pub fn listen_with(&self, cancellation: Cancellation) -> Result<EventStream> {
        let (sender, receiver) = async_channel::bounded(1);
        let task = self.with_event_sinks(&sender, true).execute_with(cancellation)?;

        Ok(EventStream {
            started: Some(CommandEvent::Started { pid: task.pid() }),
            pid: task.pid(),
            receiver,
            task: Some(task),
            outcome: None,
            finished: false,
        })
    }

    /// Run the command, pushing events into an unbounded channel
    pub fn observe(&self) -> Result<Observation> {
        self.observe_with(Cancellation::default())
    }

    /// Run the command, pushing events into an unbounded channel, with cancellation.
    ///
    /// The returned task must be awaited (or spawned) for events to flow. The
    /// channel closes after [`CommandEvent::Exited`], or without it if the run
    /// fails.
    pub fn observe_with(&self, cancellation: Cancellation) -> Result<Observation> {
        let (sender, receiver) = async_channel::unbounded();
        let task = self.with_event_sinks(&sender, false).execute_with(cancellation)?;

        let pid = task.pid();
        let _ = sender.try_send(CommandEvent::Started { pid });
        let task = task.and_then(move |result| {
            let _ = sender.try_send(CommandEvent::Exited {
                exit_code: result.exit_code,
            });
            Ok(result)
        });

        Ok(Observation {
            pid,
            events: receiver,
            task,
        })
    }

    /// A copy of this command whose output is also decoded into line events
    fn with_event_sinks(&self, sender: &Sender<CommandEvent>, wait_for_consumer: bool) -> Command {
        let encoding = self.config().text_encoding();
        let sink = |event: fn(String) -> CommandEvent| {
            let sender = sender.clone();
            if wait_for_consumer {
                Target::lines_async_with_encoding(encoding, move |text| {
                    let sender = sender.clone();
                    async move {
                        // A dropped stream only means nobody is listening anymore.
                        let _ = sender.send(event(text)).await;
                    }
                })
            } else {
                Target::lines_with_encoding(encoding, move |text| {
                    let _ = sender.try_send(event(text.to_string()));
                })
            }
        };

        let stdout = Target::merge([
            self.stdout().clone(),
            sink(|text| CommandEvent::StandardOutputLine { text }),
        ]);
        let stderr = Target::merge([
            self.stderr().clone(),
            sink(|text| CommandEvent::StandardErrorLine { text }),
        ]);

        self.clone()
            .with_stdout(stdout)
            .with_stderr(stderr)
            .with_validation(Validation::None)
    }
}

/// Pull-mode event sequence of one run.
///
/// Polling the stream drives the run. Yields `Started` first and `Exited`
/// last; if the run fails the error is yielded instead of `Exited`. Dropping
/// the stream kills the process.
pub struct EventStream {
    started: Option<CommandEvent>,
    pid: u32,
    receiver: Receiver<CommandEvent>,
    task: Option<CommandTask<CommandResult>>,
    outcome: Option<Result<CommandResult>>,
    finished: bool,
}

impl EventStream {
    /// Native process id of the child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the process to stop cooperatively
    pub fn interrupt(&self) {
        if let Some(task) = &self.task {
            task.interrupt();
        }
    }

    /// Kill the process tree; the stream then ends with a cancellation error
    pub fn kill(&self) {
        if let Some(task) = &self.task {
            task.kill();
        }
    }
}

// No field is structurally pinned; the task is boxed and the receiver is only
// polled through `try_recv`.
impl Unpin for EventStream {}

impl Stream for EventStream {
    type Item = Result<CommandEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(started) = self.started.take() {
            return Poll::Ready(Some(Ok(started)));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        if let Ok(event) = self.receiver.try_recv() {
            return Poll::Ready(Some(Ok(event)));
        }

        if let Some(task) = self.task.as_mut() {
            match Pin::new(task).poll(cx) {
                Poll::Ready(result) => {
                    self.task = None;
                    self.outcome = Some(result);
                }
                Poll::Pending => {
                    // Polling the run may have produced an event.
                    return match self.receiver.try_recv() {
                        Ok(event) => Poll::Ready(Some(Ok(event))),
                        Err(_) => Poll::Pending,
                    };
                }
            }
            // Every send completed before the run resolved, so the remaining
            // lines are already buffered.
            if let Ok(event) = self.receiver.try_recv() {
                return Poll::Ready(Some(Ok(event)));
            }
        }

        self.finished = true;
        match self.outcome.take() {
            Some(result) => Poll::Ready(Some(result.map(|result| CommandEvent::Exited {
                exit_code: result.exit_code,
            }))),
            None => Poll::Ready(None),
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("pid", &self.pid)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Push-mode view of one run
#[derive(Debug)]
pub struct Observation {
    /// Native process id of the child
    pub pid: u32,
    /// Receives `Started`, the line events and finally `Exited`
    pub events: Receiver<CommandEvent>,
    /// Drives the run; must be awaited or spawned
    pub task: CommandTask<CommandResult>,
}
