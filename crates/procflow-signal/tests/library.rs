//! procflow delivering graceful interrupts through the built helper
#![cfg(unix)]

use procflow::{Cancellation, CancellationKind, CancellationToken, Command, Config, Error};
use smol::{Timer, future};
use std::time::Duration;

const HELPER: &str = env!("CARGO_BIN_EXE_procflow-signal");

fn trapping_shell(config: Config) -> Command {
    Command::new("sh")
        .with_args(["-c", "trap 'exit 5' INT; while :; do sleep 0.05; done"])
        .with_config(config)
}

#[smol_potat::test]
async fn test_graceful_cancel_goes_through_helper() {
    let graceful = CancellationToken::new();
    let task = trapping_shell(Config::default().with_signal_helper(HELPER))
        .execute_with(Cancellation::new(CancellationToken::new(), graceful.clone()))
        .unwrap();

    let canceller = async {
        // Let the shell install its trap.
        Timer::after(Duration::from_millis(300)).await;
        graceful.cancel();
    };
    let (result, ()) = future::zip(task, canceller).await;

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
async fn test_failing_helper_leaves_forceful_path() {
    let forceful = CancellationToken::new();
    let graceful = CancellationToken::new();
    let task = trapping_shell(Config::default().with_signal_helper("/nonexistent/procflow-signal"))
        .execute_with(Cancellation::new(forceful.clone(), graceful.clone()))
        .unwrap();

    let canceller = async {
        Timer::after(Duration::from_millis(200)).await;
        graceful.cancel();
        Timer::after(Duration::from_millis(300)).await;
        forceful.cancel();
    };
    let (result, ()) = future::zip(task, canceller).await;

    assert!(matches!(
        result,
        Err(Error::Cancelled { kind: CancellationKind::Forceful, .. })
    ));
}
