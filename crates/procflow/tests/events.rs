//! Pull and push event delivery
#![cfg(unix)]

mod common;

use common::sh;
use futures::StreamExt;
use procflow::{CaptureBuffer, CommandEvent};

#[smol_potat::test]
async fn test_listen_yields_started_lines_and_exited() {
    let mut stream = sh("echo A; echo B >&2; exit 4").listen().unwrap();
    let pid = stream.pid();

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }

    assert_eq!(events.first(), Some(&CommandEvent::Started { pid }));
    assert_eq!(events.last(), Some(&CommandEvent::Exited { exit_code: 4 }));
    assert!(events.contains(&CommandEvent::StandardOutputLine { text: "A".into() }));
    assert!(events.contains(&CommandEvent::StandardErrorLine { text: "B".into() }));
    assert_eq!(events.len(), 4);
}

#[smol_potat::test]
async fn test_listen_keeps_configured_targets() {
    let copy = CaptureBuffer::new();
    let stream = sh("printf 'x\\ny\\n'").with_stdout(copy.target()).listen().unwrap();

    let lines: Vec<_> = stream
        .filter_map(|event| async move {
            match event.unwrap() {
                CommandEvent::StandardOutputLine { text } => Some(text),
                _ => None,
            }
        })
        .collect()
        .await;

    assert_eq!(lines, ["x", "y"]);
    assert_eq!(copy.bytes(), b"x\ny\n");
}

#[smol_potat::test]
async fn test_listen_preserves_order_under_backpressure() {
    let stream = sh("i=0; while [ $i -lt 500 ]; do echo $i; i=$((i+1)); done")
        .listen()
        .unwrap();

    let numbers: Vec<u32> = stream
        .filter_map(|event| async move {
            match event.unwrap() {
                CommandEvent::StandardOutputLine { text } => text.parse::<u32>().ok(),
                _ => None,
            }
        })
        .collect()
        .await;

    assert_eq!(numbers, (0..500).collect::<Vec<_>>());
}

#[smol_potat::test]
async fn test_killed_stream_ends_with_cancellation() {
    let mut stream = sh("echo ready; sleep 30").listen().unwrap();

    assert!(matches!(stream.next().await, Some(Ok(CommandEvent::Started { .. }))));
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        CommandEvent::StandardOutputLine { text: "ready".into() }
    );

    stream.kill();
    let last = stream.next().await.unwrap();
    assert!(last.unwrap_err().is_cancellation());
    assert!(stream.next().await.is_none());
}

#[smol_potat::test]
async fn test_observe_pushes_every_event() {
    let observation = sh("echo A; echo B >&2").observe().unwrap();
    let pid = observation.pid;

    let result = observation.task.await.unwrap();
    assert_eq!(result.exit_code, 0);

    let mut events = Vec::new();
    while let Ok(event) = observation.events.recv().await {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&CommandEvent::Started { pid }));
    assert_eq!(events.last(), Some(&CommandEvent::Exited { exit_code: 0 }));
    assert!(events.contains(&CommandEvent::StandardOutputLine { text: "A".into() }));
    assert!(events.contains(&CommandEvent::StandardErrorLine { text: "B".into() }));
}
