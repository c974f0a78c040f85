//! Exclusivity and polling behavior with real processes

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::Fixture;
use futures::future::join_all;
use suterm_core::application::{GatePolicy, PollOutcome, SubmitError};
use suterm_core::domain::Severity;

/// Two concurrent backups (Queue policy): both run, one after the other
#[tokio::test]
async fn test_concurrent_backups_are_serialized() {
    let fixture = Fixture::new();
    let (engine, sink) = fixture.engine(fixture.config());

    let first = engine.run_helper("backup").unwrap();
    let second = engine.run_helper("backup").unwrap();
    let (first, second) = tokio::join!(first.wait(), second.wait());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.is_success(), "first: {:?}", first.output);
    assert!(second.is_success(), "second: {:?}", second.output);
    assert!(second.started_at >= first.finished_at);

    assert!(sink.logs().iter().all(|e| e.text != "ERROR overlap"));
    assert_eq!(sink.wait_for_completions(2).await.len(), 2);

    engine.shutdown().await;
}

/// Two concurrent backups (Reject policy): the second is turned away, the first completes
#[tokio::test]
async fn test_reject_policy_turns_away_second_backup() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.policy = GatePolicy::Reject;
    let (engine, _sink) = fixture.engine(config);

    let first = engine.run_helper("backup").unwrap();
    assert!(matches!(engine.run_helper("backup"), Err(SubmitError::GateBusy)));

    assert!(first.wait().await.unwrap().is_success());
    // Slot free again once the result is out
    assert!(engine.run_helper("backup").unwrap().wait().await.unwrap().is_success());

    engine.shutdown().await;
}

/// Exactly one result per accepted request, never overlapping
#[tokio::test]
async fn test_every_request_completes_once() {
    let fixture = Fixture::new();
    let (engine, sink) = fixture.engine(fixture.config());

    let mut tickets = Vec::new();
    for i in 0..6 {
        let ticket = if i % 2 == 0 {
            engine.run_helper("backup").unwrap()
        } else {
            engine.run_shell(&format!("echo line-{}", i)).unwrap()
        };
        tickets.push(ticket);
    }
    let ids: HashSet<String> = tickets.iter().map(|t| t.id().clone()).collect();

    let results = join_all(tickets.into_iter().map(|t| t.wait())).await;
    assert!(results.iter().all(|r| r.as_ref().unwrap().is_success()));

    let completions = sink.wait_for_completions(6).await;
    assert_eq!(completions.len(), 6);
    let completed: HashSet<String> = completions.into_iter().map(|(id, _)| id).collect();
    assert_eq!(completed, ids);
    assert!(sink.logs().iter().all(|e| e.text != "ERROR overlap"));

    engine.shutdown().await;
}

/// A poll while a user command holds the slot is skipped, not queued
#[tokio::test]
async fn test_poll_skipped_while_command_runs() {
    let fixture = Fixture::new();
    let (engine, sink) = fixture.engine(fixture.config());

    let ticket = engine.run_helper("hold").unwrap();
    // Wait until the queue has actually taken the slot
    while !engine.gate().is_busy() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(engine.refresh_status().await, PollOutcome::Skipped);
    assert!(ticket.wait().await.unwrap().is_success());
    assert!(sink.snapshots().is_empty());

    assert!(matches!(engine.refresh_status().await, PollOutcome::Updated { .. }));

    engine.shutdown().await;
}

/// Periodic polling publishes snapshots; disabling it stops new probes
#[tokio::test]
async fn test_polling_loop_and_switch() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.poll_interval = Duration::from_millis(200);
    config.probe_timeout = Duration::from_millis(200);
    let (mut engine, sink) = fixture.engine(config);

    engine.start_polling();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!sink.snapshots().is_empty());
    assert!(engine.status().root_granted);

    engine.polling().disable();
    // Let an in-flight probe finish
    tokio::time::sleep(Duration::from_millis(300)).await;
    let seen = sink.snapshots().len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(sink.snapshots().len(), seen);

    assert!(sink.logs_with(Severity::Warn).is_empty());
    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .expect("shutdown should not hang");
}
