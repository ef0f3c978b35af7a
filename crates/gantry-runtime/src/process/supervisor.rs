//! Supervision of the single backend child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use gantry_core::{EventSink, LogEvent, LogLevel, PathError, ProcessRecord};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SpawnError;
use super::shutdown::shutdown_child;
use super::stream::spawn_line_reader;
use super::types::BackendSpec;
use crate::lockfile::{LockFile, sweep_stale_backend};
use crate::resolve::{resolve_backend_exe, validate_executable};

/// How long a diagnostic run may live before it is killed.
const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop()` waits for the exit watcher to finish cleanup.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

struct RunningBackend {
    record: ProcessRecord,
    cancel: CancellationToken,
}

/// Everything needed to launch the diagnostic variant after an abnormal
/// exit, captured at spawn time.
struct DiagnosticSpec {
    executable: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
}

/// Owns at most one backend child process.
///
/// The singleton invariant spans host restarts: before spawning, any
/// backend recorded in the lock record by a previous run is terminated.
/// While the child is live the supervisor streams its stdout/stderr into
/// `backend`/`backend-error` events; on abnormal exit it launches a
/// one-shot diagnostic run.
pub struct BackendSupervisor {
    lock: LockFile,
    sink: Arc<dyn EventSink>,
    /// Executable resolved once per supervisor and cached for the session.
    resolved_exe: OnceLock<PathBuf>,
    current: Arc<Mutex<Option<RunningBackend>>>,
    alive_tx: Arc<watch::Sender<bool>>,
    stopping: Arc<AtomicBool>,
}

impl BackendSupervisor {
    /// Supervisor using the canonical per-machine lock record.
    pub fn new(sink: Arc<dyn EventSink>) -> Result<Self, PathError> {
        Ok(Self::with_lock_file(LockFile::at_default_location()?, sink))
    }

    /// Supervisor with an explicit lock record location.
    pub fn with_lock_file(lock: LockFile, sink: Arc<dyn EventSink>) -> Self {
        let (alive_tx, _) = watch::channel(false);
        Self {
            lock,
            sink,
            resolved_exe: OnceLock::new(),
            current: Arc::new(Mutex::new(None)),
            alive_tx: Arc::new(alive_tx),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the supervised backend is currently alive.
    pub fn is_running(&self) -> bool {
        *self.alive_tx.borrow()
    }

    /// Liveness signal for the health monitor: `false` while the backend
    /// process is known dead.
    pub fn alive_watch(&self) -> watch::Receiver<bool> {
        self.alive_tx.subscribe()
    }

    /// Record of the currently supervised backend, if any.
    pub fn current_record(&self) -> Option<ProcessRecord> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|running| running.record.clone())
    }

    /// Start the backend.
    ///
    /// Terminates any stale instance recorded by a previous host run before
    /// spawning, writes a fresh lock record on success, and begins streaming
    /// the child's output as events.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] when no executable resolves, the spawn itself
    /// fails, or this supervisor already owns a live backend. The failure is
    /// also surfaced as an ERROR event for user visibility; no lock record
    /// is written on failure.
    pub async fn start(&self, spec: &BackendSpec) -> Result<ProcessRecord, SpawnError> {
        match self.try_start(spec).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.sink.emit(LogEvent::system(
                    LogLevel::Error,
                    format!("failed to start backend: {e}"),
                ));
                Err(e)
            }
        }
    }

    async fn try_start(&self, spec: &BackendSpec) -> Result<ProcessRecord, SpawnError> {
        {
            let current = self.current.lock().unwrap();
            if let Some(running) = current.as_ref() {
                return Err(SpawnError::AlreadyRunning {
                    pid: running.record.pid,
                });
            }
        }

        // A stale instance from a previous host run must die before we spawn
        match sweep_stale_backend(&self.lock).await {
            Ok(outcome) => debug!(?outcome, "lock record sweep finished"),
            Err(e) => warn!(error = %e, "lock record sweep failed, continuing"),
        }

        let exe = self.resolve_executable(spec)?;

        let mut child = build_command(&exe, spec).spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SpawnError::ExecutableNotFound { path: exe.clone() },
            std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied {
                path: exe.clone(),
            },
            _ => SpawnError::Io(e),
        })?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::Io(std::io::Error::other("spawned backend has no pid")))?;

        let record = ProcessRecord::new(
            pid,
            exe.to_string_lossy(),
            spec.entry.clone(),
            spec.working_dir.clone(),
        );
        if let Err(e) = self.lock.write(&record) {
            warn!(error = %e, "failed to write lock record");
        }

        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, "backend", LogLevel::Info, self.sink.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, "backend-error", LogLevel::Error, self.sink.clone());
        }

        let cancel = CancellationToken::new();
        self.stopping.store(false, Ordering::SeqCst);
        {
            let mut current = self.current.lock().unwrap();
            *current = Some(RunningBackend {
                record: record.clone(),
                cancel: cancel.clone(),
            });
        }
        let _ = self.alive_tx.send(true);

        info!(pid, command = %record.command, "backend started");
        self.sink.emit(LogEvent::system(
            LogLevel::Info,
            format!("backend started (pid {pid})"),
        ));

        let diagnostic = spec.diagnostic_entry.as_ref().map(|args| DiagnosticSpec {
            executable: exe,
            args: args.clone(),
            working_dir: spec.working_dir.clone(),
            env: spec.env.clone(),
        });
        self.spawn_exit_watcher(child, pid, cancel, diagnostic);

        Ok(record)
    }

    /// Stop the backend. Idempotent: calling this after the process is
    /// already gone is a no-op, and the lock record is cleared even when
    /// termination itself errors.
    pub async fn stop(&self) {
        let cancel = {
            let current = self.current.lock().unwrap();
            current.as_ref().map(|running| running.cancel.clone())
        };

        let Some(cancel) = cancel else {
            // Repeated calls after the process is already gone are no-ops
            debug!("stop requested but no backend is running");
            return;
        };

        self.stopping.store(true, Ordering::SeqCst);
        cancel.cancel();

        // Wait for the exit watcher to finish its cleanup
        let mut alive = self.alive_tx.subscribe();
        let drained = async {
            while *alive.borrow_and_update() {
                if alive.changed().await.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(STOP_TIMEOUT, drained).await.is_err() {
            warn!("timed out waiting for backend shutdown");
        }

        if let Err(e) = self.lock.delete() {
            debug!(error = %e, "failed to delete lock record");
        }
    }

    fn resolve_executable(&self, spec: &BackendSpec) -> Result<PathBuf, SpawnError> {
        if let Some(explicit) = &spec.executable {
            return validate_executable(explicit);
        }
        if let Some(cached) = self.resolved_exe.get() {
            return Ok(cached.clone());
        }
        let exe = resolve_backend_exe(spec)?;
        let _ = self.resolved_exe.set(exe.clone());
        Ok(exe)
    }

    fn spawn_exit_watcher(
        &self,
        mut child: Child,
        pid: u32,
        cancel: CancellationToken,
        diagnostic: Option<DiagnosticSpec>,
    ) {
        let sink = self.sink.clone();
        let lock = self.lock.clone();
        let current = self.current.clone();
        let alive_tx = self.alive_tx.clone();
        let stopping = self.stopping.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                () = cancel.cancelled() => {
                    debug!("shutting down backend");
                    shutdown_child(child).await.ok()
                }
            };

            // Guarded: a newer instance may already own the slot
            if let Err(e) = lock.delete_if_pid(pid) {
                debug!(error = %e, "failed to delete lock record");
            }
            current.lock().unwrap().take();
            let _ = alive_tx.send(false);

            let deliberate = stopping.load(Ordering::SeqCst);
            match status {
                Some(status) if !deliberate && !status.success() => {
                    warn!(%status, "backend exited unexpectedly");
                    sink.emit(LogEvent::system(
                        LogLevel::Error,
                        format!("backend exited unexpectedly ({status})"),
                    ));
                    if let Some(diag) = diagnostic {
                        launch_diagnostic(diag, sink.clone());
                    }
                }
                Some(status) => {
                    info!(%status, "backend exited");
                }
                None => {}
            }
        });
    }
}

fn build_command(exe: &Path, spec: &BackendSpec) -> Command {
    let mut cmd = Command::new(exe);
    cmd.args(&spec.entry)
        .current_dir(&spec.working_dir)
        // The child's streams must be UTF-8 text regardless of platform
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUNBUFFERED", "1")
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Launch the diagnostic variant after an abnormal exit.
///
/// Fire-and-forget: not subject to the singleton lock, output streamed as
/// `diagnostic` events, killed if still running after [`DIAGNOSTIC_TIMEOUT`].
fn launch_diagnostic(spec: DiagnosticSpec, sink: Arc<dyn EventSink>) {
    info!(args = ?spec.args, "launching diagnostic run");
    sink.emit(LogEvent::system(
        LogLevel::Warning,
        "collecting diagnostics after abnormal backend exit",
    ));

    let launch = BackendSpec::new(spec.working_dir, spec.args);
    let mut cmd = build_command(&spec.executable, &launch);
    cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    match cmd.spawn() {
        Ok(mut child) => {
            if let Some(stdout) = child.stdout.take() {
                spawn_line_reader(stdout, "diagnostic", LogLevel::Info, sink.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                spawn_line_reader(stderr, "diagnostic", LogLevel::Error, sink);
            }
            tokio::spawn(async move {
                match tokio::time::timeout(DIAGNOSTIC_TIMEOUT, child.wait()).await {
                    Ok(Ok(status)) => debug!(%status, "diagnostic run finished"),
                    Ok(Err(e)) => debug!(error = %e, "diagnostic run failed"),
                    Err(_) => {
                        warn!("diagnostic run timed out, killing it");
                        let _ = child.kill().await;
                    }
                }
            });
        }
        Err(e) => {
            sink.emit(LogEvent::system(
                LogLevel::Error,
                format!("failed to launch diagnostic run: {e}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::NoopEventSink;

    fn temp_supervisor() -> (tempfile::TempDir, BackendSupervisor) {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let lock = LockFile::new(dir.path().join("backend.lock"));
        let supervisor = BackendSupervisor::with_lock_file(lock, Arc::new(NoopEventSink));
        (dir, supervisor)
    }

    #[tokio::test]
    async fn not_running_initially() {
        let (_dir, supervisor) = temp_supervisor();
        assert!(!supervisor.is_running());
        assert!(supervisor.current_record().is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let (_dir, supervisor) = temp_supervisor();
        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }
}
