//! Spawn failure taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when starting the backend process.
///
/// All of these are fatal to that start attempt only: the supervisor stays
/// in the not-running state and a later explicit `start` may succeed.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// No backend runtime resolved at this location (explicit path, bundled
    /// runtime, or system fallback).
    #[error(
        "backend runtime not found at: {path}\n\nInstall the bundled runtime or make python3 available on PATH"
    )]
    ExecutableNotFound {
        /// The path (or search root) where the runtime was expected
        path: PathBuf,
    },

    /// The runtime exists but is not executable.
    #[error("backend runtime exists but is not executable: {path}")]
    NotExecutable {
        /// The path to the non-executable binary
        path: PathBuf,
    },

    /// The runtime exists but permission was denied when accessing it.
    #[error("permission denied accessing backend runtime: {path}")]
    PermissionDenied {
        /// The path to the inaccessible binary
        path: PathBuf,
    },

    /// This supervisor already owns a live backend.
    #[error("backend is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// Any other spawn failure.
    #[error("failed to spawn backend: {0}")]
    Io(#[from] std::io::Error),
}
