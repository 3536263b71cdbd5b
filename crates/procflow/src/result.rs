//! Results of completed runs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a run that exited on its own with every pump drained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code; `128 + n` for a Unix process terminated by signal `n`
    pub exit_code: i32,
    /// When the process was started
    pub start_time: DateTime<Utc>,
    /// When the process was observed to exit
    pub exit_time: DateTime<Utc>,
}

impl CommandResult {
    /// Returns true if the exit code is zero
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Wall-clock time between start and exit
    pub fn run_time(&self) -> Duration {
        self.exit_time - self.start_time
    }
}

/// A [`CommandResult`] together with the captured output text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedCommandResult {
    /// Exit code; `128 + n` for a Unix process terminated by signal `n`
    pub exit_code: i32,
    /// When the process was started
    pub start_time: DateTime<Utc>,
    /// When the process was observed to exit
    pub exit_time: DateTime<Utc>,
    /// Everything written to standard output
    pub stdout: String,
    /// Everything written to standard error
    pub stderr: String,
}

impl BufferedCommandResult {
    pub(crate) fn new(result: CommandResult, stdout: String, stderr: String) -> Self {
        Self {
            exit_code: result.exit_code,
            start_time: result.start_time,
            exit_time: result.exit_time,
            stdout,
            stderr,
        }
    }

    /// Returns true if the exit code is zero
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Wall-clock time between start and exit
    pub fn run_time(&self) -> Duration {
        self.exit_time - self.start_time
    }
}

impl From<BufferedCommandResult> for CommandResult {
    fn from(result: BufferedCommandResult) -> Self {
        Self {
            exit_code: result.exit_code,
            start_time: result.start_time,
            exit_time: result.exit_time,
        }
    }
}
