//! Persisted process record for the supervised backend.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a spawned backend process, persisted to the lock record so a
/// later host instance can detect and terminate a stale backend.
///
/// Owned exclusively by the supervisor while the process is live; written as
/// a single overwritten slot, removed on clean stop or observed exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// OS process id.
    pub pid: u32,
    /// When the process was spawned.
    pub started_at: DateTime<Utc>,
    /// Working directory the process was spawned in.
    pub working_dir: PathBuf,
    /// Executable that was invoked.
    pub command: String,
    /// Arguments the executable was invoked with.
    pub args: Vec<String>,
}

impl ProcessRecord {
    /// Create a record with the current timestamp.
    pub fn new(
        pid: u32,
        command: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            working_dir: working_dir.into(),
            command: command.into(),
            args,
        }
    }

    /// Final path component of the recorded command, used for conservative
    /// process-identity checks before killing a recorded pid.
    pub fn command_name(&self) -> &str {
        Path::new(&self.command)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.command)
    }
}
