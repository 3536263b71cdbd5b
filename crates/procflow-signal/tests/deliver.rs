//! Runs the built helper against real processes
#![cfg(unix)]

use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

const HELPER: &str = env!("CARGO_BIN_EXE_procflow-signal");

fn helper(pid: u32, signal: i32) -> std::process::ExitStatus {
    Command::new(HELPER)
        .arg(pid.to_string())
        .arg(signal.to_string())
        .stdout(Stdio::null())
        .status()
        .expect("failed to run helper")
}

#[test]
fn test_interrupt_reaches_trapping_shell() {
    let mut child = Command::new("sh")
        .args(["-c", "trap 'exit 7' INT; while :; do sleep 0.05; done"])
        .spawn()
        .unwrap();
    // Let the shell install its trap.
    thread::sleep(Duration::from_millis(300));

    let status = helper(child.id(), libc_sigint());
    assert!(status.success(), "helper failed: {status:?}");
    assert_eq!(child.wait().unwrap().code(), Some(7));
}

#[test]
fn test_missing_process_fails_with_errno() {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();

    let status = helper(pid, libc_sigint());
    assert_eq!(status.code(), Some(nix::errno::Errno::ESRCH as i32));
}

#[test]
fn test_bad_arguments_are_rejected() {
    let status = Command::new(HELPER)
        .arg("not-a-pid")
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success());
}

fn libc_sigint() -> i32 {
    nix::sys::signal::Signal::SIGINT as i32
}
