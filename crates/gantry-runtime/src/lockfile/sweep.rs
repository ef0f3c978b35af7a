//! Startup cleanup of a stale backend left behind by a previous host run.

use tracing::{debug, info, warn};

use super::io::{LockFile, LockRecordError};
use super::verify::{is_recorded_backend, pid_exists};
use crate::process::shutdown::terminate_pid;

/// What the sweep found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No lock record existed.
    Clean,
    /// A record existed but its process was gone, unverifiable, or the
    /// record itself was malformed; only the record was removed.
    RemovedStaleRecord,
    /// A verified stale backend was terminated and the record removed.
    TerminatedStale { pid: u32 },
}

/// Terminate the backend instance a previous host run left behind, if any.
///
/// # Strategy
/// 1. Read the lock record (malformed content counts as stale).
/// 2. If the recorded pid is gone, just remove the record.
/// 3. If the pid is alive, verify it still looks like our backend before
///    killing it — a reused pid belonging to someone else only gets its
///    record removed.
/// 4. Always clear the record, even when termination fails.
pub async fn sweep_stale_backend(lock: &LockFile) -> Result<SweepOutcome, LockRecordError> {
    let record = match lock.read() {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!("no stale lock record found");
            return Ok(SweepOutcome::Clean);
        }
        Err(LockRecordError::Malformed(reason)) => {
            warn!(%reason, "removing malformed lock record");
            lock.delete()?;
            return Ok(SweepOutcome::RemovedStaleRecord);
        }
        Err(e) => return Err(e),
    };

    if !pid_exists(record.pid) {
        debug!(pid = record.pid, "recorded backend already gone, removing stale record");
        lock.delete()?;
        return Ok(SweepOutcome::RemovedStaleRecord);
    }

    if !is_recorded_backend(&record) {
        debug!(
            pid = record.pid,
            "recorded pid no longer matches our backend, removing stale record"
        );
        lock.delete()?;
        return Ok(SweepOutcome::RemovedStaleRecord);
    }

    info!(pid = record.pid, "terminating stale backend from a previous run");
    if let Err(e) = terminate_pid(record.pid).await {
        warn!(pid = record.pid, error = %e, "failed to terminate stale backend cleanly");
    }
    lock.delete()?;

    Ok(SweepOutcome::TerminatedStale { pid: record.pid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::ProcessRecord;

    #[tokio::test]
    async fn sweep_is_clean_without_a_record() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let lock = LockFile::new(dir.path().join("backend.lock"));
        let outcome = sweep_stale_backend(&lock).await.expect("sweep failed");
        assert_eq!(outcome, SweepOutcome::Clean);
    }

    #[tokio::test]
    async fn sweep_removes_record_for_dead_pid() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let lock = LockFile::new(dir.path().join("backend.lock"));
        let record = ProcessRecord::new(999_999, "python3", vec!["main.py".into()], "/srv");
        lock.write(&record).expect("write failed");

        let outcome = sweep_stale_backend(&lock).await.expect("sweep failed");
        assert_eq!(outcome, SweepOutcome::RemovedStaleRecord);
        assert!(lock.read().expect("read failed").is_none());
    }

    #[tokio::test]
    async fn sweep_removes_malformed_record() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let lock = LockFile::new(dir.path().join("backend.lock"));
        std::fs::write(lock.path(), "{not json").expect("write failed");

        let outcome = sweep_stale_backend(&lock).await.expect("sweep failed");
        assert_eq!(outcome, SweepOutcome::RemovedStaleRecord);
        assert!(lock.read().expect("read failed").is_none());
    }

    #[tokio::test]
    async fn sweep_spares_an_unrelated_reused_pid() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let lock = LockFile::new(dir.path().join("backend.lock"));
        // Our own pid is alive but is certainly not a python backend
        let record = ProcessRecord::new(
            std::process::id(),
            "python3",
            vec!["main.py".into()],
            "/srv",
        );
        lock.write(&record).expect("write failed");

        let outcome = sweep_stale_backend(&lock).await.expect("sweep failed");
        assert_eq!(outcome, SweepOutcome::RemovedStaleRecord);
    }
}
