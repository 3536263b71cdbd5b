//! Native process lifecycle
//!
//! A [`ProcessHandle`] owns exactly one spawned child for exactly one run. It
//! is created by [`spawn`], which also hands out the OS-level stream endpoints
//! the pumps read and write, and it kills the process tree when dropped before
//! the exit was observed.

use async_process::{Child, ChildStderr, ChildStdin, ChildStdout, Stdio};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::io::{AsyncRead, AsyncWrite};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::signal::Interrupter;

#[cfg(unix)]
use crate::pty::{PtyReader, PtyWriter};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitStatus {
    /// Exit code if the process exited normally
    pub(crate) code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub(crate) signal: Option<i32>,
}

impl ExitStatus {
    /// Exit code reported to callers; `128 + n` when killed by signal `n`
    pub(crate) fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

/// A freshly spawned child and its stream endpoints
pub(crate) struct SpawnedProcess {
    pub(crate) handle: ProcessHandle,
    pub(crate) stdin: Option<InputEndpoint>,
    pub(crate) stdout: Option<OutputEndpoint>,
    pub(crate) stderr: Option<OutputEndpoint>,
}

/// Exclusive owner of one native child process
pub(crate) struct ProcessHandle {
    child: Child,
    pid: u32,
    start_time: DateTime<Utc>,
    exited: bool,
    interrupter: Interrupter,
}

impl ProcessHandle {
    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Future resolving once the child exits.
    ///
    /// The future does not borrow the handle, so it can race against
    /// cancellation and still be awaited after a kill.
    pub(crate) fn wait(&mut self) -> BoxFuture<'static, Result<ExitStatus>> {
        let status = self.child.status();
        Box::pin(async move { Ok(ExitStatus::from(status.await?)) })
    }

    /// Record that the exit has been observed; the handle no longer kills on drop
    pub(crate) fn mark_exited(&mut self) {
        self.exited = true;
    }

    pub(crate) fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Kill the child and every process in its group.
    ///
    /// Killing a process that already exited is not an error.
    pub(crate) fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            // The child leads its own process group (or session in PTY mode).
            match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => {
                    return Err(Error::signal_failed(Signal::SIGKILL as i32, errno.to_string()));
                }
            }
        }

        #[cfg(windows)]
        {
            let status = std::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &self.pid.to_string()])
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            if let Err(e) = status {
                debug!(pid = self.pid, error = %e, "taskkill unavailable");
            }
        }

        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(Error::signal_failed(-1, e.to_string())),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.exited {
            debug!(pid = self.pid, "killing process that outlived its run");
            if let Err(e) = self.kill() {
                warn!(pid = self.pid, error = %e, "failed to kill process on drop");
            }
        }
    }
}

/// Start the process described by `command`.
///
/// Standard streams whose pipe is `Null` are connected to the null device, so
/// no pump is needed for them. In PTY mode all three are attached to the
/// terminal and the combined output comes back as `stdout`.
pub(crate) fn spawn(command: &Command) -> Result<SpawnedProcess> {
    let command_line = command.to_string();

    if let Some(dir) = command.current_dir() {
        if !dir.is_dir() {
            return Err(Error::spawn_failed(
                command_line,
                format!("working directory '{}' does not exist", dir.display()),
            ));
        }
    }

    let mut std_cmd = std::process::Command::new(command.program());
    std_cmd.args(command.args());
    if let Some(dir) = command.current_dir() {
        std_cmd.current_dir(dir);
    }
    for (key, value) in command.envs() {
        match value {
            Some(value) => std_cmd.env(key, value),
            None => std_cmd.env_remove(key),
        };
    }

    #[cfg(unix)]
    let pty = unix::configure(&mut std_cmd, command)?;
    #[cfg(windows)]
    windows::configure(&mut std_cmd, command)?;

    // Stdio must be set on the async command: it replaces anything left
    // unset with `inherit` at spawn time.
    let mut cmd = async_process::Command::from(std_cmd);
    #[cfg(unix)]
    let pty_master = match pty {
        Some((master, slave)) => {
            cmd.stdin(slave.try_clone()?).stdout(slave.try_clone()?).stderr(slave);
            Some(master)
        }
        None => {
            configure_pipes(&mut cmd, command);
            None
        }
    };
    #[cfg(not(unix))]
    configure_pipes(&mut cmd, command);

    let spawned = cmd.spawn();
    // Drops the parent's copies of the terminal slave, if any.
    drop(cmd);
    let mut child = spawned.map_err(|e| classify_spawn_error(command, &command_line, e))?;

    let pid = child.id();
    let start_time = Utc::now();
    debug!(pid, command = %command_line, "process spawned");

    let stdin = child.stdin.take().map(InputEndpoint::Pipe);
    let stdout = child.stdout.take().map(OutputEndpoint::Stdout);
    let stderr = child.stderr.take().map(OutputEndpoint::Stderr);

    let handle = ProcessHandle {
        child,
        pid,
        start_time,
        exited: false,
        interrupter: Interrupter::new(pid, command.config()),
    };

    // From here on an early return drops `handle`, which kills the child.
    #[cfg(unix)]
    let (stdin, stdout) = match pty_master {
        Some(master) => {
            let eof_on_close = command.config().pty_eof_on_close;
            (
                Some(InputEndpoint::Pty(master.writer(eof_on_close)?)),
                Some(OutputEndpoint::Pty(master.reader())),
            )
        }
        None => (stdin, stdout),
    };

    Ok(SpawnedProcess {
        handle,
        stdin,
        stdout,
        stderr,
    })
}

fn configure_pipes(cmd: &mut async_process::Command, command: &Command) {
    let stdio = |piped: bool| if piped { Stdio::piped() } else { Stdio::null() };
    cmd.stdin(stdio(!command.stdin().is_null()));
    cmd.stdout(stdio(!command.stdout().is_null()));
    cmd.stderr(stdio(!command.stderr().is_null()));
}

fn classify_spawn_error(command: &Command, command_line: &str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::CommandNotFound {
            command: command.program().to_string_lossy().into_owned(),
        },
        _ => Error::spawn_failed(command_line, e.to_string()),
    }
}

#[cfg(unix)]
mod unix {
    use std::os::unix::process::CommandExt;

    use std::os::fd::OwnedFd;

    use crate::command::Command;
    use crate::error::{Error, Result};
    use crate::pty::{self, PtyMaster};

    /// Apply credentials, process group and resource policy. In PTY mode the
    /// terminal is opened and both of its ends are returned; the caller
    /// attaches the slave to the child's standard streams.
    #[allow(unsafe_code)]
    pub(super) fn configure(
        std_cmd: &mut std::process::Command,
        command: &Command,
    ) -> Result<Option<(PtyMaster, OwnedFd)>> {
        let credentials = command.credentials();
        // Domain, password and profile only exist for Windows logons.
        if credentials.domain.is_some()
            || credentials.password.is_some()
            || credentials.load_user_profile
        {
            return Err(Error::unsupported(
                "logon domain, password and user profile credentials",
            ));
        }
        if let Some(name) = &credentials.user_name {
            let user = nix::unistd::User::from_name(name)?
                .ok_or_else(|| Error::invalid_command(format!("unknown user '{name}'")))?;
            std_cmd.uid(user.uid.as_raw()).gid(user.gid.as_raw());
        }

        let resources = *command.resources();
        let nice = resources.priority.nice_value();
        if nice != 0 {
            // SAFETY: setpriority is async-signal-safe.
            unsafe {
                std_cmd.pre_exec(move || {
                    if libc::setpriority(libc::PRIO_PROCESS as _, 0, nice) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }
        if let Some(mask) = resources.affinity {
            set_affinity(std_cmd, mask)?;
        }

        let Some(options) = command.pty() else {
            std_cmd.process_group(0);
            return Ok(None);
        };

        let (master, slave) = pty::open(options)?;
        // SAFETY: setsid and ioctl are async-signal-safe.
        unsafe {
            std_cmd.pre_exec(|| {
                nix::unistd::setsid()?;
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        Ok(Some((master, slave)))
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[allow(unsafe_code)]
    fn set_affinity(std_cmd: &mut std::process::Command, mask: u64) -> Result<()> {
        use nix::sched::{CpuSet, sched_setaffinity};
        use nix::unistd::Pid;

        let mut cpus = CpuSet::new();
        for cpu in (0..64).filter(|cpu| mask & (1 << cpu) != 0) {
            cpus.set(cpu)?;
        }
        // SAFETY: sched_setaffinity is a plain syscall.
        unsafe {
            std_cmd.pre_exec(move || {
                sched_setaffinity(Pid::from_raw(0), &cpus)?;
                Ok(())
            });
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn set_affinity(_std_cmd: &mut std::process::Command, _mask: u64) -> Result<()> {
        Err(Error::unsupported("processor affinity"))
    }
}

#[cfg(windows)]
mod windows {
    use std::os::windows::process::CommandExt;

    use crate::command::Command;
    use crate::error::{Error, Result};

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    /// The child gets its own hidden console so that Ctrl+C can be delivered
    /// to it without reaching the caller.
    pub(super) fn configure(std_cmd: &mut std::process::Command, command: &Command) -> Result<()> {
        if !command.credentials().is_empty() {
            return Err(Error::unsupported("running as another user"));
        }
        if command.resources().affinity.is_some() {
            return Err(Error::unsupported("processor affinity"));
        }
        if command.pty().is_some() {
            return Err(Error::unsupported("pseudo-terminal mode"));
        }
        std_cmd.creation_flags(CREATE_NO_WINDOW | command.resources().priority.priority_class());
        Ok(())
    }
}

/// Write end of the child's standard input
pub(crate) enum InputEndpoint {
    Pipe(ChildStdin),
    #[cfg(unix)]
    Pty(PtyWriter),
}

impl AsyncWrite for InputEndpoint {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            InputEndpoint::Pipe(pipe) => Pin::new(pipe).poll_write(cx, buf),
            #[cfg(unix)]
            InputEndpoint::Pty(pty) => Pin::new(pty).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            InputEndpoint::Pipe(pipe) => Pin::new(pipe).poll_flush(cx),
            #[cfg(unix)]
            InputEndpoint::Pty(pty) => Pin::new(pty).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            InputEndpoint::Pipe(pipe) => Pin::new(pipe).poll_close(cx),
            #[cfg(unix)]
            InputEndpoint::Pty(pty) => Pin::new(pty).poll_close(cx),
        }
    }
}

/// Read end of the child's standard output, standard error or terminal
pub(crate) enum OutputEndpoint {
    Stdout(ChildStdout),
    Stderr(ChildStderr),
    #[cfg(unix)]
    Pty(PtyReader),
}

impl AsyncRead for OutputEndpoint {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            OutputEndpoint::Stdout(pipe) => Pin::new(pipe).poll_read(cx, buf),
            OutputEndpoint::Stderr(pipe) => Pin::new(pipe).poll_read(cx, buf),
            #[cfg(unix)]
            OutputEndpoint::Pty(pty) => Pin::new(pty).poll_read(cx, buf),
        }
    }
}
