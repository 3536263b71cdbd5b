//! Common test utilities
#![allow(dead_code)]

use procflow::Command;

/// A command running `script` through `sh -c`
pub fn sh(script: &str) -> Command {
    Command::new("sh").with_args(["-c", script])
}

/// Whether `pid` still names a live process. Zombies count as dead.
pub fn is_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // The state follows the parenthesized command name.
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z"),
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}
