//! Graceful and forceful cancellation of running processes
#![cfg(unix)]

mod common;

use common::{is_alive, sh};
use procflow::{Cancellation, CancellationKind, CancellationToken, Command, Error, Target};
use smol::Timer;
use std::time::{Duration, Instant};

#[smol_potat::test]
async fn test_forceful_cancel_kills_process() {
    let forceful = CancellationToken::new();
    let task = Command::new("sleep")
        .with_arg("30")
        .with_stdout(Target::lines(|_| {}))
        .execute_with(Cancellation::forceful(forceful.clone()))
        .unwrap();
    let pid = task.pid();

    let started = Instant::now();
    let canceller = async {
        Timer::after(Duration::from_millis(200)).await;
        forceful.cancel();
    };
    let (result, ()) = futures::join!(task, canceller);

    match result {
        Err(Error::Cancelled {
            kind: CancellationKind::Forceful,
            exit_code,
            exit_time,
            ..
        }) => {
            assert_eq!(exit_code, Some(128 + 9));
            assert!(exit_time.is_some());
        }
        other => panic!("expected forceful cancellation, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!is_alive(pid), "process {pid} survived forceful cancellation");
}

#[smol_potat::test]
async fn test_forceful_cancel_before_start_still_spawns_then_kills() {
    let forceful = CancellationToken::new();
    forceful.cancel();

    let result = Command::new("sleep")
        .with_arg("30")
        .execute_with(Cancellation::forceful(forceful))
        .unwrap()
        .await;
    assert!(matches!(
        result,
        Err(Error::Cancelled { kind: CancellationKind::Forceful, .. })
    ));
}

#[cfg(target_os = "linux")]
#[smol_potat::test]
async fn test_forceful_cancel_kills_descendants() {
    use std::sync::{Arc, Mutex};

    let grandchild = Arc::new(Mutex::new(None::<u32>));
    let sink = grandchild.clone();
    let forceful = CancellationToken::new();

    let task = sh("sleep 30 & echo $!; wait")
        .with_stdout(Target::lines(move |line| {
            *sink.lock().unwrap() = line.trim().parse::<u32>().ok();
        }))
        .execute_with(Cancellation::forceful(forceful.clone()))
        .unwrap();

    let canceller = async {
        while grandchild.lock().unwrap().is_none() {
            Timer::after(Duration::from_millis(20)).await;
        }
        forceful.cancel();
    };
    let (result, ()) = futures::join!(task, canceller);
    assert!(result.unwrap_err().is_cancellation());

    let pid = grandchild.lock().unwrap().unwrap();
    // The orphan is reaped by init, which may take a moment.
    let deadline = Instant::now() + Duration::from_secs(5);
    while is_alive(pid) && Instant::now() < deadline {
        Timer::after(Duration::from_millis(50)).await;
    }
    assert!(!is_alive(pid), "grandchild {pid} survived");
}

#[smol_potat::test]
async fn test_graceful_cancel_is_honored() {
    let graceful = CancellationToken::new();
    let task = sh("trap 'exit 5' INT; while :; do sleep 0.05; done")
        .execute_with(Cancellation::new(CancellationToken::new(), graceful.clone()))
        .unwrap();

    let canceller = async {
        // Let the shell install its trap.
        Timer::after(Duration::from_millis(300)).await;
        graceful.cancel();
    };
    let (result, ()) = futures::join!(task, canceller);

    match result {
        Err(Error::Cancelled {
            kind: CancellationKind::Graceful,
            exit_code,
            ..
        }) => assert_eq!(exit_code, Some(5)),
        other => panic!("expected graceful cancellation, got {other:?}"),
    }
}

#[smol_potat::test]
async fn test_ignored_interrupt_then_forceful_cancel() {
    let forceful = CancellationToken::new();
    let graceful = CancellationToken::new();
    let task = sh("trap '' INT; sleep 5")
        .execute_with(Cancellation::new(forceful.clone(), graceful.clone()))
        .unwrap();

    let started = Instant::now();
    let canceller = async {
        Timer::after(Duration::from_millis(200)).await;
        graceful.cancel();
        Timer::after(Duration::from_millis(300)).await;
        forceful.cancel();
    };
    let (result, ()) = futures::join!(task, canceller);

    assert!(matches!(
        result,
        Err(Error::Cancelled { kind: CancellationKind::Forceful, .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[smol_potat::test]
async fn test_task_handles_cancel_the_run() {
    let task = Command::new("sleep").with_arg("30").execute().unwrap();
    task.kill();
    let err = task.await.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(err.exit_code(), Some(137));
}

#[smol_potat::test]
async fn test_dropping_task_kills_process() {
    let task = Command::new("sleep").with_arg("30").execute().unwrap();
    let pid = task.pid();
    drop(task);

    let deadline = Instant::now() + Duration::from_secs(5);
    while is_alive(pid) && Instant::now() < deadline {
        Timer::after(Duration::from_millis(50)).await;
    }
    assert!(!is_alive(pid), "process should be killed when the task is dropped");
}

#[smol_potat::test]
async fn test_forceful_wins_when_both_requested_up_front() {
    let forceful = CancellationToken::new();
    let graceful = CancellationToken::new();
    graceful.cancel();
    forceful.cancel();

    let result = Command::new("sleep")
        .with_arg("30")
        .execute_with(Cancellation::new(forceful, graceful))
        .unwrap()
        .await;

    match result {
        Err(Error::Cancelled {
            kind: CancellationKind::Forceful,
            exit_code,
            ..
        }) => assert_eq!(exit_code, Some(137)),
        other => panic!("expected forceful cancellation, got {other:?}"),
    }
}

#[smol_potat::test]
async fn test_interrupt_after_exit_is_not_sent() {
    // `true` as the helper reports every interrupt as delivered.
    let graceful = CancellationToken::new();
    let task = sh("(sleep 1) & exit 0")
        .with_stdout(Target::lines(|_| {}))
        .with_config(procflow::Config::default().with_signal_helper("true"))
        .execute_with(Cancellation::new(CancellationToken::new(), graceful.clone()))
        .unwrap();

    let canceller = async {
        // The shell has exited; the background subshell still holds stdout.
        Timer::after(Duration::from_millis(300)).await;
        graceful.cancel();
    };
    let (result, ()) = futures::join!(task, canceller);

    assert_eq!(result.unwrap().exit_code, 0);
}
