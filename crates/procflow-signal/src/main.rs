//! Delivers an interrupt to another process
//!
//! Usage: `procflow-signal <pid> <signal>`
//!
//! On Windows the helper detaches from its own console, attaches to the
//! console of `<pid>` and raises the console control event `<signal>`
//! (0 = Ctrl+C, 1 = Ctrl+Break) there. Elsewhere `<signal>` is a signal number
//! sent with `kill(2)`.
//!
//! Exits with 0 when the signal was delivered, otherwise with the native
//! error code of the failing call.

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "PROCFLOW_SIGNAL_LOG";

#[derive(Parser, Debug)]
#[command(name = "procflow-signal")]
#[command(about = "Deliver an interrupt to another process")]
#[command(version)]
struct Cli {
    /// Process id to signal
    pid: u32,

    /// Console control event (Windows) or signal number (Unix)
    #[arg(allow_negative_numbers = true)]
    signal: i32,
}

fn main() {
    // Log to stderr; stdout is never read by the caller.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_ansi(false)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    debug!(pid = cli.pid, signal = cli.signal, "delivering signal");

    if let Err(code) = deliver(cli.pid, cli.signal) {
        error!(pid = cli.pid, signal = cli.signal, code, "signal delivery failed");
        std::process::exit(code);
    }
}

#[cfg(unix)]
fn deliver(pid: u32, signal: i32) -> Result<(), i32> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let signal = Signal::try_from(signal).map_err(|e| e as i32)?;
    let pid = i32::try_from(pid).map_err(|_| Errno::EINVAL as i32)?;
    kill(Pid::from_raw(pid), signal).map_err(|e| e as i32)
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn deliver(pid: u32, signal: i32) -> Result<(), i32> {
    use windows_sys::Win32::Foundation::{ERROR_INVALID_PARAMETER, GetLastError};
    use windows_sys::Win32::System::Console::{
        AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, SetConsoleCtrlHandler,
    };

    let event = u32::try_from(signal).map_err(|_| ERROR_INVALID_PARAMETER as i32)?;

    // SAFETY: these calls only change the console state of this process.
    unsafe {
        FreeConsole();
        if AttachConsole(pid) == 0 {
            return Err(GetLastError() as i32);
        }
        // The event is raised for every process on the console, this one included.
        if SetConsoleCtrlHandler(None, 1) == 0 {
            return Err(GetLastError() as i32);
        }
        if GenerateConsoleCtrlEvent(event, 0) == 0 {
            return Err(GetLastError() as i32);
        }
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn deliver(_pid: u32, _signal: i32) -> Result<(), i32> {
    Err(1)
}
