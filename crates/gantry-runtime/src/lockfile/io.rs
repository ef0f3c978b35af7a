//! Atomic lock record I/O.
//!
//! Format: one JSON-serialized [`ProcessRecord`]. Single slot — every write
//! overwrites the previous record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gantry_core::{PathError, ProcessRecord, lock_record_path};
use thiserror::Error;

/// Errors that can occur while accessing the lock record.
#[derive(Debug, Error)]
pub enum LockRecordError {
    #[error("failed to access lock record: {0}")]
    Io(#[from] io::Error),

    /// The record exists but does not parse. The sweep treats this as a
    /// stale record and removes it.
    #[error("lock record is malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Handle to the lock record slot at a fixed path.
///
/// Production code uses [`LockFile::at_default_location`]; tests point the
/// slot into a temporary directory so sessions stay independent.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Lock record at the canonical per-machine location.
    pub fn at_default_location() -> Result<Self, PathError> {
        Ok(Self {
            path: lock_record_path()?,
        })
    }

    /// Lock record at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record atomically: write `<path>.tmp`, then rename
    /// (atomic on Unix/macOS). Overwrites the single slot.
    pub fn write(&self, record: &ProcessRecord) -> Result<(), LockRecordError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("lock.tmp");
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| LockRecordError::Malformed(e.to_string()))?;
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Read the record. `Ok(None)` when no record exists.
    pub fn read(&self) -> Result<Option<ProcessRecord>, LockRecordError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_str(&content)
            .map_err(|e| LockRecordError::Malformed(e.to_string()))?;
        Ok(Some(record))
    }

    /// Delete the record (idempotent — no error if missing).
    pub fn delete(&self) -> Result<(), LockRecordError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the record only if it still names `pid`. A newer instance may
    /// have overwritten the slot; its record must survive.
    pub fn delete_if_pid(&self, pid: u32) -> Result<(), LockRecordError> {
        match self.read() {
            Ok(Some(record)) if record.pid == pid => self.delete(),
            Ok(_) => Ok(()),
            Err(LockRecordError::Malformed(_)) => self.delete(),
            Err(e) => Err(e),
        }
    }
}
