//! Dispatch engine scheduling, lifecycle and live watching.

mod common;

use changewatch::event::{RawEvent, RawKind};
use changewatch::watcher::{DispatchEngine, EngineState, WatchError};
use common::*;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_schedule_drops_missing_paths_and_counts_valid_groups() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings = settings(
        scratch.path(),
        vec![
            group(&scratch.path().join("does-not-exist"), vec![alert_handler(&["cre"], 0)]),
            group(data.path(), vec![alert_handler(&["cre"], 0)]),
        ],
    );
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    assert_eq!(engine.state(), EngineState::Stopped);

    assert_eq!(engine.schedule().unwrap(), 1);
    assert_eq!(engine.state(), EngineState::Scheduling);
    assert_eq!(engine.groups()[0].root(), canonical(data.path()));
}

#[test]
fn test_first_schedule_removes_logs_of_earlier_runs() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let log_dir = scratch.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    let stale = log_dir.join("docs-0123456789abcdef.log");
    let stale_copy = log_dir.join("docs-0123456789abcdef.20261019-101500.123.log.gz");
    let unrelated = log_dir.join("notes.txt");
    let process_log = log_dir.join("changewatch.log");
    for path in [&stale, &stale_copy, &unrelated, &process_log] {
        fs::write(path, "left behind\n").unwrap();
    }

    let settings = settings(scratch.path(), vec![group(data.path(), vec![message_handler(&["cre"], 60)])]);
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    assert!(!stale.exists());
    assert!(!stale_copy.exists());
    assert!(unrelated.exists());
    assert!(process_log.exists());

    // Files of the live epoch survive later reconfigurations
    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    let live = engine.groups()[0].channels()[0].log().unwrap().path().to_path_buf();
    fs::write(&stale, "again\n").unwrap();
    let mut same = engine.settings().clone();
    same.cleanup_logs = false;
    engine.reconfigure(same).unwrap();
    assert!(stale.exists());
    assert!(!live.exists());
}

#[test]
fn test_schedule_without_valid_groups_fails() {
    let scratch = TempDir::new().unwrap();
    let recorder = Recorder::new();
    let settings = settings(
        scratch.path(),
        vec![group(&scratch.path().join("missing"), vec![alert_handler(&["cre"], 0)])],
    );
    let mut engine = DispatchEngine::new(settings, courier(&recorder));

    assert!(matches!(engine.schedule(), Err(WatchError::NoWatchGroups)));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn test_rejected_reconfiguration_keeps_current_epoch() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let good = settings(scratch.path(), vec![group(data.path(), vec![alert_handler(&["cre"], 0)])]);
    let mut engine = DispatchEngine::new(good, courier(&recorder));
    engine.schedule().unwrap();
    let epoch = engine.epoch();

    let bad = settings(scratch.path(), Vec::new());
    assert!(matches!(engine.reconfigure(bad), Err(WatchError::NoWatchGroups)));
    assert_eq!(engine.epoch(), epoch);
    assert_eq!(engine.groups().len(), 1);

    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    assert_eq!(recorder.alerts().len(), 1);
}

#[test]
fn test_reconfiguration_replaces_epoch_and_releases_old_logs() {
    let scratch = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings_a = settings(scratch.path(), vec![group(first.path(), vec![message_handler(&["cre"], 60)])]);
    let mut engine = DispatchEngine::new(settings_a, courier(&recorder));
    engine.schedule().unwrap();

    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    let old_log = engine.groups()[0].channels()[0].log().unwrap().path().to_path_buf();
    assert!(old_log.exists());

    let settings_b = settings(scratch.path(), vec![group(second.path(), vec![alert_handler(&["cre"], 0)])]);
    assert_eq!(engine.reconfigure(settings_b).unwrap(), 1);
    assert!(!old_log.exists());
    assert_eq!(engine.groups()[0].root(), canonical(second.path()));

    // Batched content of the replaced epoch is not delivered
    assert_eq!(recorder.total(), 0);
}

#[test]
fn test_tick_drives_rollovers() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings = settings(scratch.path(), vec![group(data.path(), vec![message_handler(&["cre"], 1)])]);
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    engine.dispatch(0, &RawEvent::new(RawKind::Deleted, root.join("a.txt")));

    assert_eq!(engine.tick(Instant::now() + Duration::from_secs(2)), 1);
    let sent = recorder.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].envelope.body.lines().count(), 1);
}

#[test]
fn test_stop_is_idempotent_and_cleans_up() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings = settings(scratch.path(), vec![group(data.path(), vec![message_handler(&["cre"], 60)])]);
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    let log = engine.groups()[0].channels()[0].log().unwrap().path().to_path_buf();

    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.groups().is_empty());
    assert!(!log.exists());

    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn test_cleanup_policy_keeps_files() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let mut settings = settings(scratch.path(), vec![group(data.path(), vec![message_handler(&["cre"], 60)])]);
    settings.cleanup_logs = false;
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    let root = engine.groups()[0].root().to_path_buf();
    engine.dispatch(0, &RawEvent::new(RawKind::Created, root.join("a.txt")));
    let log = engine.groups()[0].channels()[0].log().unwrap().path().to_path_buf();

    engine.stop();
    assert!(log.exists());
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings = settings(scratch.path(), vec![group(data.path(), vec![alert_handler(&["cre"], 0)])]);
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    let ct = CancellationToken::new();
    let cancel = ct.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    tokio::time::timeout(Duration::from_secs(10), engine.run(ct))
        .await
        .expect("engine did not stop")
        .unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.groups().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_backend_reports_new_files() {
    let scratch = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let recorder = Recorder::new();

    let settings = settings(scratch.path(), vec![group(data.path(), vec![alert_handler(&["cre"], 0)])]);
    let mut engine = DispatchEngine::new(settings, courier(&recorder));
    engine.schedule().unwrap();

    let ct = CancellationToken::new();
    let cancel = ct.clone();
    let watcher = recorder.clone();
    let file = data.path().join("fresh.txt");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        fs::write(&file, "hello").unwrap();
        for _ in 0..100 {
            if !watcher.alerts().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        cancel.cancel();
    });

    engine.run(ct).await.unwrap();

    let alerts = recorder.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].body.contains("CREATED FILE fresh.txt"));
}
