//! Error types for command execution

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cancel::CancellationKind;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// The command descriptor cannot be executed as configured
    #[error("invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected
        reason: String,
    },

    /// The target executable could not be found
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The program that was not found
        command: String,
    },

    /// Failed to spawn a process
    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed {
        /// The command line that failed to start
        command: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// A requested option is not available on this platform
    #[error("not supported on this platform: {feature}")]
    Unsupported {
        /// The option that cannot be honored
        feature: String,
    },

    /// The process exited with a non-zero code while validation was enabled
    #[error("command '{command}' exited with non-zero code {exit_code}{}", stderr_suffix(.stderr))]
    Validation {
        /// The command line that was run
        command: String,
        /// The exit code reported by the process
        exit_code: i32,
        /// Captured standard error, when the run was buffered
        stderr: Option<String>,
    },

    /// The run was cancelled before it could produce a result
    #[error("command was cancelled ({kind})")]
    Cancelled {
        /// Which cancellation signal ended the run
        kind: CancellationKind,
        /// Exit code observed after the process stopped, if known
        exit_code: Option<i32>,
        /// When the process was started
        start_time: Option<DateTime<Utc>>,
        /// When the process was observed to exit, if it did
        exit_time: Option<DateTime<Utc>>,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!("\n\nstandard error:\n{text}"),
        _ => String::new(),
    }
}

impl Error {
    /// Create an invalid command error
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error
    pub fn spawn_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Create an unsupported option error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Returns true if the run ended because of a cancellation request
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Returns true if the run failed exit code validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// The exit code carried by validation and cancellation errors
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Validation { exit_code, .. } => Some(*exit_code),
            Error::Cancelled { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Returns true if the error is a write into a pipe whose reader is gone
    pub(crate) fn is_broken_pipe(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
            #[cfg(unix)]
            Error::Nix(errno) => *errno == nix::errno::Errno::EPIPE,
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_includes_stderr() {
        let err = Error::Validation {
            command: "sh -c exit 3".to_string(),
            exit_code: 3,
            stderr: Some("boom\n".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("non-zero code 3"));
        assert!(msg.ends_with("boom"));
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.is_validation());
    }

    #[test]
    fn test_validation_message_without_stderr() {
        let err = Error::Validation {
            command: "false".to_string(),
            exit_code: 1,
            stderr: Some("   ".to_string()),
        };
        assert_eq!(err.to_string(), "command 'false' exited with non-zero code 1");
    }

    #[test]
    fn test_broken_pipe_classification() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.is_broken_pipe());
        assert!(!Error::invalid_command("empty").is_broken_pipe());
    }

    #[test]
    fn test_cancelled_carries_exit_code() {
        let err = Error::Cancelled {
            kind: CancellationKind::Forceful,
            exit_code: Some(137),
            start_time: None,
            exit_time: None,
        };
        assert!(err.is_cancellation());
        assert_eq!(err.exit_code(), Some(137));
        assert_eq!(err.to_string(), "command was cancelled (forceful)");
    }
}
