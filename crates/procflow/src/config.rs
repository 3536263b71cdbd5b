//! Engine defaults supplied to every run
//!
//! A [`Config`] is a plain value attached to a [`Command`](crate::Command).
//! The engine reads it when a run starts and never modifies it.

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Default number of bytes moved per pump iteration
pub const DEFAULT_CHUNK_SIZE: usize = 81_920;

/// Environment variable overriding [`Config::chunk_size`]
pub const CHUNK_SIZE_ENV: &str = "PROCFLOW_CHUNK_SIZE";
/// Environment variable overriding [`Config::encoding`]
pub const ENCODING_ENV: &str = "PROCFLOW_ENCODING";
/// Environment variable overriding [`Config::signal_helper`]
pub const SIGNAL_HELPER_ENV: &str = "PROCFLOW_SIGNAL_HELPER";

/// Read-only defaults consulted by the engine at execute time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes requested per read from a pipe
    pub chunk_size: usize,
    /// Label of the default text encoding (WHATWG label, e.g. `utf-8`)
    pub encoding: String,
    /// Path of the `procflow-signal` helper used for interrupts on Windows
    pub signal_helper: Option<PathBuf>,
    /// Send the terminal end-of-file character when stdin ends in PTY mode
    pub pty_eof_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            encoding: "utf-8".to_string(),
            signal_helper: None,
            pty_eof_on_close: true,
        }
    }
}

impl Config {
    /// Defaults overlaid with the `PROCFLOW_*` environment variables.
    ///
    /// Values that cannot be parsed are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(CHUNK_SIZE_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.chunk_size = size,
                _ => warn!(value = %raw, "ignoring invalid {}", CHUNK_SIZE_ENV),
            }
        }

        if let Ok(label) = std::env::var(ENCODING_ENV) {
            if Encoding::for_label(label.trim().as_bytes()).is_some() {
                config.encoding = label.trim().to_string();
            } else {
                warn!(value = %label, "ignoring unknown {}", ENCODING_ENV);
            }
        }

        if let Some(path) = std::env::var_os(SIGNAL_HELPER_ENV) {
            config.signal_helper = Some(PathBuf::from(path));
        }

        config
    }

    /// Set the pump chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the default text encoding label
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set the path of the signal helper executable
    pub fn with_signal_helper(mut self, path: impl Into<PathBuf>) -> Self {
        self.signal_helper = Some(path.into());
        self
    }

    /// Resolve the configured encoding, falling back to UTF-8
    pub fn text_encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.encoding.as_bytes()).unwrap_or(encoding_rs::UTF_8)
    }

    /// Chunk size with a floor of one byte
    pub(crate) fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Helper path to use: configured, else `procflow-signal` next to the current executable
    pub(crate) fn resolve_signal_helper(&self) -> Option<PathBuf> {
        if let Some(path) = &self.signal_helper {
            return Some(path.clone());
        }
        let exe = std::env::current_exe().ok()?;
        let name = format!("procflow-signal{}", std::env::consts::EXE_SUFFIX);
        Some(exe.parent()?.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.text_encoding(), encoding_rs::UTF_8);
        assert!(config.pty_eof_on_close);
    }

    #[test]
    fn test_unknown_encoding_falls_back_to_utf8() {
        let config = Config::default().with_encoding("not-an-encoding");
        assert_eq!(config.text_encoding(), encoding_rs::UTF_8);
    }

    #[test]
    fn test_known_encoding_label() {
        let config = Config::default().with_encoding("latin1");
        assert_eq!(config.text_encoding(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        assert_eq!(Config::default().with_chunk_size(0).effective_chunk_size(), 1);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{"chunk_size": 1024}"#).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.encoding, "utf-8");
    }

    #[test]
    fn test_explicit_signal_helper_wins() {
        let config = Config::default().with_signal_helper("/opt/helper");
        assert_eq!(
            config.resolve_signal_helper(),
            Some(PathBuf::from("/opt/helper"))
        );
    }
}
