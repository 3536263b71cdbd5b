//! Runtime-agnostic child process execution
//!
//! This crate launches an external program, feeds its standard input from a
//! [`Source`], delivers its standard output and error to [`Target`]s, and
//! reports the outcome through an awaitable [`CommandTask`]. Runs can be
//! observed as a stream of [`CommandEvent`]s and stopped either gracefully
//! (an interrupt the program may ignore) or forcefully (the process tree is
//! killed).
//!
//! Nothing here spawns tasks or depends on a specific executor: the task
//! returned by [`Command::execute`] drives all I/O when it is polled.
//!
//! ```no_run
//! # futures_lite::future::block_on(async {
//! use procflow::{CancellationToken, Cancellation, Command, Source, Target};
//!
//! let forceful = CancellationToken::new();
//! let command = Source::text("hello\n")
//!     | Command::new("cat")
//!     | Target::lines(|line| println!("cat says: {line}"));
//!
//! let task = command.execute_with(Cancellation::forceful(forceful.clone()))?;
//! println!("running as pid {}", task.pid());
//! let result = task.await?;
//! assert_eq!(result.exit_code, 0);
//! # procflow::Result::Ok(()) });
//! ```

#![warn(missing_docs)]

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod options;
pub mod pipe;
pub mod result;
pub mod task;

mod process;
mod pump;
#[cfg(unix)]
mod pty;
mod signal;

pub use cancel::{Cancellation, CancellationKind, CancellationToken};
pub use command::Command;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{CommandEvent, EventStream, Observation};
pub use options::{Credentials, ProcessPriority, PtyOptions, ResourcePolicy, Validation};
pub use pipe::{CaptureBuffer, LineHandler, SharedReader, SharedWriter, Source, Target};
pub use result::{BufferedCommandResult, CommandResult};
pub use task::CommandTask;
