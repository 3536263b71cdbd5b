//! Run options carried by a [`Command`](crate::Command)

use serde::{Deserialize, Serialize};

/// Identity the child process runs as
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Windows logon domain
    pub domain: Option<String>,
    /// Account name; resolved to a uid/gid pair on Unix
    pub user_name: Option<String>,
    /// Windows logon password
    pub password: Option<String>,
    /// Load the user's profile before starting (Windows only; rejected elsewhere)
    pub load_user_profile: bool,
}

impl Credentials {
    /// Run as the named user
    pub fn user(user_name: impl Into<String>) -> Self {
        Self {
            user_name: Some(user_name.into()),
            ..Self::default()
        }
    }

    /// Returns true if nothing is set, meaning the child inherits the caller's identity
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.user_name.is_none()
            && self.password.is_none()
            && !self.load_user_profile
    }
}

/// Scheduling priority of the child process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessPriority {
    /// Only runs when the system is idle
    Idle,
    /// Below normal
    BelowNormal,
    /// The default priority
    #[default]
    Normal,
    /// Above normal
    AboveNormal,
    /// High
    High,
    /// Highest available; usually needs elevated privileges
    Realtime,
}

impl ProcessPriority {
    /// Equivalent `nice` value on Unix
    pub fn nice_value(self) -> i32 {
        match self {
            ProcessPriority::Idle => 19,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Normal => 0,
            ProcessPriority::AboveNormal => -5,
            ProcessPriority::High => -10,
            ProcessPriority::Realtime => -20,
        }
    }

    /// Equivalent Windows priority class creation flag
    pub fn priority_class(self) -> u32 {
        match self {
            ProcessPriority::Idle => 0x0000_0040,
            ProcessPriority::BelowNormal => 0x0000_4000,
            ProcessPriority::Normal => 0x0000_0020,
            ProcessPriority::AboveNormal => 0x0000_8000,
            ProcessPriority::High => 0x0000_0080,
            ProcessPriority::Realtime => 0x0000_0100,
        }
    }
}

/// Priority and processor affinity applied at spawn time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Scheduling priority
    pub priority: ProcessPriority,
    /// Bitmask of CPUs the child may run on (Linux only)
    pub affinity: Option<u64>,
}

impl ResourcePolicy {
    /// Set the priority
    pub fn with_priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Restrict the child to the CPUs in `mask`
    pub fn with_affinity(mut self, mask: u64) -> Self {
        self.affinity = Some(mask);
        self
    }
}

/// Terminal size used when running attached to a pseudo-terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyOptions {
    /// Width in character cells
    pub columns: u16,
    /// Height in character cells
    pub rows: u16,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self { columns: 80, rows: 24 }
    }
}

/// Whether a non-zero exit code fails the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validation {
    /// Any exit code is accepted
    None,
    /// A non-zero exit code fails the run with [`Error::Validation`](crate::Error::Validation)
    #[default]
    ZeroExitCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_maps_to_nice() {
        let ordered = [
            ProcessPriority::Idle,
            ProcessPriority::BelowNormal,
            ProcessPriority::Normal,
            ProcessPriority::AboveNormal,
            ProcessPriority::High,
            ProcessPriority::Realtime,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].nice_value() > pair[1].nice_value());
        }
        assert_eq!(ProcessPriority::default().nice_value(), 0);
    }

    #[test]
    fn test_defaults() {
        assert!(Credentials::default().is_empty());
        assert!(!Credentials::user("nobody").is_empty());
        assert_eq!(ResourcePolicy::default().priority, ProcessPriority::Normal);
        assert_eq!(ResourcePolicy::default().with_affinity(1).affinity, Some(1));
        assert_eq!(Validation::default(), Validation::ZeroExitCode);
        assert_eq!(PtyOptions::default(), PtyOptions { columns: 80, rows: 24 });
    }
}
