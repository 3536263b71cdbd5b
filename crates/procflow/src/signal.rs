//! Interrupt delivery
//!
//! On Unix the interrupt is a plain `SIGINT`. Windows has no API to send
//! Ctrl+C to an unrelated process without attaching to its console, which
//! would disturb the caller's own console, so the request is delegated to the
//! `procflow-signal` helper executable. A helper that is missing or fails
//! means the interrupt had no effect; it never fails the run.

use async_process::Stdio;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Signal id passed to the helper: `CTRL_C_EVENT` on Windows, `SIGINT` elsewhere
#[cfg(windows)]
const INTERRUPT_SIGNAL: i32 = 0;
#[cfg(unix)]
const INTERRUPT_SIGNAL: i32 = libc::SIGINT;
#[cfg(not(any(unix, windows)))]
const INTERRUPT_SIGNAL: i32 = 2;

/// Asks one process to stop cooperatively
#[derive(Debug, Clone)]
pub(crate) struct Interrupter {
    pid: u32,
    helper: Option<PathBuf>,
}

impl Interrupter {
    /// An explicitly configured helper is always used. Otherwise Windows looks
    /// for the helper next to the current executable and Unix signals directly.
    pub(crate) fn new(pid: u32, config: &Config) -> Self {
        let helper = if cfg!(windows) {
            config.resolve_signal_helper()
        } else {
            config.signal_helper.clone()
        };
        Self { pid, helper }
    }

    /// Request the interrupt. Returns true if it was delivered.
    pub(crate) async fn interrupt(&self) -> bool {
        let delivered = match &self.helper {
            Some(helper) => signal_via_helper(helper, self.pid, INTERRUPT_SIGNAL).await,
            None => signal_native(self.pid),
        };
        match delivered {
            Ok(()) => {
                debug!(pid = self.pid, "interrupt delivered");
                true
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "interrupt could not be delivered");
                false
            }
        }
    }
}

#[cfg(unix)]
fn signal_native(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGINT)
        .map_err(|e| Error::signal_failed(Signal::SIGINT as i32, e.to_string()))
}

#[cfg(not(unix))]
fn signal_native(_pid: u32) -> Result<()> {
    Err(Error::unsupported("interrupts without the signal helper"))
}

/// Run `helper <pid> <signal>`; exit code 0 means the signal was delivered
async fn signal_via_helper(helper: &Path, pid: u32, signal: i32) -> Result<()> {
    let status = async_process::Command::new(helper)
        .arg(pid.to_string())
        .arg(signal.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            Error::signal_failed(signal, format!("cannot run '{}': {e}", helper.display()))
        })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(Error::signal_failed(
            signal,
            format!("signal helper exited with code {code}"),
        )),
        None => Err(Error::signal_failed(signal, "signal helper was terminated")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_missing_helper_is_not_delivered() {
        let config = Config::default().with_signal_helper("/nonexistent/procflow-signal");
        let interrupter = Interrupter::new(std::process::id(), &config);
        assert!(!interrupter.interrupt().await);
    }

    #[smol_potat::test]
    async fn test_helper_exit_code_is_reported() {
        let err = signal_via_helper(Path::new("false"), 1, INTERRUPT_SIGNAL).await.unwrap_err();
        assert!(err.to_string().contains("exited with code 1"), "{err}");
        signal_via_helper(Path::new("true"), 1, INTERRUPT_SIGNAL).await.unwrap();
    }

    #[smol_potat::test]
    async fn test_native_interrupt_of_exited_pid_fails() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!Interrupter::new(pid, &Config::default()).interrupt().await);
    }
}
