//! Integration tests for backend supervision and the singleton lock record.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{RecordingSink, init_tracing, wait_until};
use gantry_runtime::lockfile::pid_exists;
use gantry_runtime::{BackendSpec, BackendSupervisor, LockFile, SpawnError};

fn temp_lock() -> (tempfile::TempDir, LockFile) {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let lock = LockFile::new(dir.path().join("backend.lock"));
    (dir, lock)
}

#[cfg(unix)]
fn sh_spec(working_dir: &Path, script: &str) -> BackendSpec {
    BackendSpec::new(working_dir, vec!["-c".to_string(), script.to_string()])
        .with_executable("/bin/sh")
}

#[tokio::test]
async fn spawn_failure_leaves_no_lock_record() {
    init_tracing();
    let (dir, lock) = temp_lock();
    let sink = RecordingSink::new();
    let supervisor = BackendSupervisor::with_lock_file(lock.clone(), sink.clone());

    let spec = BackendSpec::new(dir.path(), vec!["main.py".to_string()])
        .with_executable(dir.path().join("missing-runtime"));

    let result = supervisor.start(&spec).await;
    assert!(matches!(result, Err(SpawnError::ExecutableNotFound { .. })));
    assert!(!supervisor.is_running());
    assert!(lock.read().expect("read failed").is_none());

    // The failure is user-visible, not just returned
    assert!(
        sink.events()
            .iter()
            .any(|e| e.source == "system" && e.message.contains("failed to start backend"))
    );
}

#[tokio::test]
#[cfg(unix)]
async fn start_streams_output_and_stop_clears_the_record() {
    init_tracing();
    let (dir, lock) = temp_lock();
    let sink = RecordingSink::new();
    let supervisor = BackendSupervisor::with_lock_file(lock.clone(), sink.clone());

    let record = supervisor
        .start(&sh_spec(dir.path(), "echo ready; sleep 30"))
        .await
        .expect("start failed");

    assert!(supervisor.is_running());
    assert_eq!(
        supervisor.current_record().map(|r| r.pid),
        Some(record.pid)
    );
    assert_eq!(
        lock.read().expect("read failed").map(|r| r.pid),
        Some(record.pid)
    );

    // The child's stdout line must surface as a `backend` event
    assert!(
        wait_until(Duration::from_secs(2), || sink.contains("backend", "ready")).await,
        "stdout line never became an event"
    );

    supervisor.stop().await;
    assert!(!supervisor.is_running());
    assert!(lock.read().expect("read failed").is_none());
    assert!(!pid_exists(record.pid));

    // Idempotent: a second stop after the process is gone is a no-op
    supervisor.stop().await;
}

#[tokio::test]
#[cfg(unix)]
async fn second_supervisor_terminates_the_recorded_backend() {
    init_tracing();
    let (dir, lock) = temp_lock();

    let first = BackendSupervisor::with_lock_file(lock.clone(), RecordingSink::new());
    let record_one = first
        .start(&sh_spec(dir.path(), "sleep 30"))
        .await
        .expect("first start failed");
    assert!(pid_exists(record_one.pid));

    // A second host instance sharing the lock record must kill the first
    // backend before its own spawn succeeds
    let second = BackendSupervisor::with_lock_file(lock.clone(), RecordingSink::new());
    let record_two = second
        .start(&sh_spec(dir.path(), "sleep 30"))
        .await
        .expect("second start failed");

    assert_ne!(record_one.pid, record_two.pid);
    assert!(
        wait_until(Duration::from_secs(3), || !pid_exists(record_one.pid)).await,
        "first backend survived the takeover"
    );
    assert!(pid_exists(record_two.pid));

    second.stop().await;
    first.stop().await;
}

#[tokio::test]
#[cfg(unix)]
async fn double_start_is_refused_while_running() {
    init_tracing();
    let (dir, lock) = temp_lock();
    let supervisor = BackendSupervisor::with_lock_file(lock, RecordingSink::new());

    let spec = sh_spec(dir.path(), "sleep 30");
    supervisor.start(&spec).await.expect("start failed");

    let result = supervisor.start(&spec).await;
    assert!(matches!(result, Err(SpawnError::AlreadyRunning { .. })));

    supervisor.stop().await;
}

#[tokio::test]
#[cfg(unix)]
async fn abnormal_exit_emits_error_and_runs_the_diagnostic() {
    init_tracing();
    let (dir, lock) = temp_lock();
    let sink = RecordingSink::new();
    let supervisor = BackendSupervisor::with_lock_file(lock.clone(), sink.clone());

    let spec = BackendSpec::new(
        dir.path(),
        vec!["-c".to_string(), "echo boom >&2; exit 1".to_string()],
    )
    .with_executable("/bin/sh")
    .with_diagnostic_entry(vec!["-c".to_string(), "echo diag-report".to_string()]);

    supervisor.start(&spec).await.expect("start failed");

    // The crash becomes a user-visible ERROR and the one-shot diagnostic
    // variant reports through its own source tag
    assert!(
        wait_until(Duration::from_secs(3), || {
            sink.events()
                .iter()
                .any(|e| e.source == "system" && e.message.contains("exited unexpectedly"))
        })
        .await,
        "no crash event was emitted"
    );
    assert!(
        wait_until(Duration::from_secs(3), || {
            sink.contains("diagnostic", "diag-report")
        })
        .await,
        "diagnostic output never surfaced"
    );
    assert!(
        wait_until(Duration::from_secs(2), || !supervisor.is_running()).await
    );
    assert!(lock.read().expect("read failed").is_none());

    // The stderr of the crashed backend surfaced as backend-error
    assert!(sink.contains("backend-error", "boom"));
}

#[tokio::test]
#[cfg(unix)]
async fn crashed_backend_can_be_started_again() {
    init_tracing();
    let (dir, lock) = temp_lock();
    let supervisor = BackendSupervisor::with_lock_file(lock, RecordingSink::new());

    supervisor
        .start(&sh_spec(dir.path(), "exit 1"))
        .await
        .expect("start failed");
    assert!(
        wait_until(Duration::from_secs(2), || !supervisor.is_running()).await,
        "crash was never observed"
    );

    // A later explicit start must succeed
    supervisor
        .start(&sh_spec(dir.path(), "sleep 30"))
        .await
        .expect("restart failed");
    assert!(supervisor.is_running());

    supervisor.stop().await;
}

#[tokio::test]
async fn shared_supervisor_exposes_its_liveness_watch() {
    // The supervisor is shared behind an Arc between the UI layer and the
    // health monitor wiring; make sure the API surface works through one
    let (dir, lock) = temp_lock();
    let supervisor = Arc::new(BackendSupervisor::with_lock_file(
        lock,
        RecordingSink::new(),
    ));
    let alive = supervisor.alive_watch();
    assert!(!*alive.borrow());
    drop(dir);
}
