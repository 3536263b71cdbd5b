//! Concurrent I/O pump
//!
//! One [`RunSession`] exists per execution. It owns the process handle and
//! the three stream endpoints, and [`RunSession::run`] drives everything
//! concurrently on the caller's executor:
//!
//! - the exit wait, which races the process against forceful cancellation
//! - `Source -> stdin`, stopped once the process has exited
//! - `stdout -> Target` and `stderr -> Target`, which drain until EOF
//! - the graceful watcher, which requests one interrupt and then idles
//!
//! A pump that fails aborts the run: the process tree is killed and the other
//! pumps are cancelled, so nothing is left blocked on a full pipe.

use chrono::{DateTime, Utc};
use futures_lite::future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::cancel::{Cancellation, CancellationKind, CancellationToken};
use crate::command::Command;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipe::{SharedWriter, Source, Target, cancellable};
use crate::process::{self, ExitStatus, InputEndpoint, OutputEndpoint, ProcessHandle};
use crate::result::CommandResult;

type Outcome = (
    (Result<ExitStatus>, DateTime<Utc>),
    Result<()>,
    Result<()>,
    Result<()>,
);

/// One execution of a [`Command`]: a spawned process plus its pumps
pub(crate) struct RunSession {
    command: Command,
    process: ProcessHandle,
    stdin: Option<InputEndpoint>,
    stdout: Option<OutputEndpoint>,
    stderr: Option<OutputEndpoint>,
    cancellation: Cancellation,
}

impl RunSession {
    /// Spawn the process. No pump runs until [`run`](Self::run) is polled.
    pub(crate) fn start(command: &Command, cancellation: Cancellation) -> Result<Self> {
        if command.program().is_empty() {
            return Err(Error::invalid_command("target path is empty"));
        }

        let spawned = process::spawn(command)?;
        info!(pid = spawned.handle.pid(), command = %command, "command started");

        Ok(Self {
            command: command.clone(),
            process: spawned.handle,
            stdin: spawned.stdin,
            stdout: spawned.stdout,
            stderr: spawned.stderr,
            cancellation,
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.process.start_time()
    }

    /// Drive the run to completion.
    ///
    /// Resolves once the process has exited and every pump has finished.
    pub(crate) async fn run(self) -> Result<CommandResult> {
        let RunSession {
            command,
            mut process,
            stdin,
            stdout,
            stderr,
            cancellation,
        } = self;

        let pid = process.pid();
        let start_time = process.start_time();
        let config = command.config();
        let interrupter = process.interrupter();

        // Fires on forceful cancellation or when a pump fails.
        let abort = cancellation.forceful.child_token();
        // Additionally fires once the process has exited.
        let stdin_stop = abort.child_token();
        let interrupted = AtomicBool::new(false);
        // Set once the child has been reaped; its pid may be reused after that.
        let exited = AtomicBool::new(false);

        let mut wait = process.wait();
        let exit = async {
            let observed = future::or(async { Some((&mut wait).await) }, async {
                abort.cancelled().await;
                None
            })
            .await;
            let status = match observed {
                Some(status) => status,
                None => {
                    debug!(pid, "killing process tree");
                    if let Err(e) = process.kill() {
                        warn!(pid, error = %e, "failed to kill process");
                    }
                    wait.await
                }
            };
            let exit_time = Utc::now();
            if status.is_ok() {
                process.mark_exited();
                exited.store(true, Ordering::Release);
            }
            stdin_stop.cancel();
            (status, exit_time)
        };

        let stdin_pump = async {
            let result = pump_input(stdin, command.stdin(), &stdin_stop, &abort, config).await;
            settle(result, &abort, pid, "stdin")
        };
        let stdout_pump = async {
            let result = pump_output(stdout, command.stdout(), &abort, config).await;
            settle(result, &abort, pid, "stdout")
        };
        let stderr_pump = async {
            let result = pump_output(stderr, command.stderr(), &abort, config).await;
            settle(result, &abort, pid, "stderr")
        };

        let graceful = async {
            cancellation.graceful.cancelled().await;
            if exited.load(Ordering::Acquire) {
                debug!(pid, "interrupt skipped, process already exited");
            } else if !cancellation.forceful.is_cancelled() {
                info!(pid, "interrupt requested");
                if interrupter.interrupt().await {
                    interrupted.store(true, Ordering::Release);
                }
            }
            future::pending::<Outcome>().await
        };

        let work = async { futures::join!(exit, stdin_pump, stdout_pump, stderr_pump) };
        let ((status, exit_time), stdin_result, stdout_result, stderr_result) =
            future::or(work, graceful).await;

        let requested = cancellation.requested();
        if requested == Some(CancellationKind::Forceful) {
            let exit_code = status.as_ref().ok().map(ExitStatus::exit_code);
            info!(pid, ?exit_code, "command killed");
            return Err(Error::Cancelled {
                kind: CancellationKind::Forceful,
                exit_code,
                start_time: Some(start_time),
                exit_time: Some(exit_time),
            });
        }

        let exit_code = status?.exit_code();
        info!(pid, exit_code, "command exited");

        stdin_result?;
        stdout_result?;
        stderr_result?;

        if requested == Some(CancellationKind::Graceful) && interrupted.load(Ordering::Acquire) {
            return Err(Error::Cancelled {
                kind: CancellationKind::Graceful,
                exit_code: Some(exit_code),
                start_time: Some(start_time),
                exit_time: Some(exit_time),
            });
        }

        Ok(CommandResult {
            exit_code,
            start_time,
            exit_time,
        })
    }
}

/// Map a finished pump to the run's view of it.
///
/// Cancellation is never a pump failure: either the process exited, the run
/// was killed, or another pump already failed and recorded why.
fn settle(result: Result<()>, abort: &CancellationToken, pid: u32, pump: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancellation() => {
            debug!(pid, pump, "pump cancelled");
            Ok(())
        }
        Err(e) => {
            warn!(pid, pump, error = %e, "pump failed, aborting run");
            abort.cancel();
            Err(e)
        }
    }
}

/// Copy the source into the child's stdin, then close it so the child sees EOF.
///
/// A child that closes its stdin early only ends this pump.
async fn pump_input(
    endpoint: Option<InputEndpoint>,
    source: &Source,
    stop: &CancellationToken,
    abort: &CancellationToken,
    config: &Config,
) -> Result<()> {
    let Some(endpoint) = endpoint else {
        return Ok(());
    };
    let writer = SharedWriter::new(endpoint);

    let copied = source.copy_to(&writer, stop, config).await;
    let closed = match cancellable(abort, writer.release()).await {
        Ok(closed) => closed.map_err(Error::from),
        Err(e) => Err(e),
    };

    match copied.and_then(|bytes| closed.map(|()| bytes)) {
        Ok(bytes) => {
            debug!(bytes, "stdin pump finished");
            Ok(())
        }
        Err(e) if e.is_broken_pipe() => {
            debug!("child closed its stdin early");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn pump_output(
    endpoint: Option<OutputEndpoint>,
    target: &Target,
    cancel: &CancellationToken,
    config: &Config,
) -> Result<()> {
    let Some(mut endpoint) = endpoint else {
        return Ok(());
    };
    target.copy_from(&mut endpoint, cancel, config).await
}
