//! Backend executable resolution.
//!
//! The launcher prefers the runtime it ships with and only then falls back
//! to whatever the system provides. Resolution order:
//! 1. `GANTRY_BACKEND_EXE` environment variable (explicit override)
//! 2. Bundled runtime under the backend working directory
//! 3. System `python3`/`python`, accepted only when a trivial liveness
//!    probe (`--version`) succeeds

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::process::{BackendSpec, SpawnError};

/// Bundled-runtime candidates relative to the backend working directory.
const BUNDLED_CANDIDATES: &[&str] = &[
    ".venv/bin/python3",
    ".venv/bin/python",
    ".venv/Scripts/python.exe",
];

/// System-wide fallbacks, probed in order.
const SYSTEM_CANDIDATES: &[&str] = &["python3", "python"];

/// Resolve the executable for the given spec. The first candidate that
/// exists (bundled) or answers the liveness probe (system) wins.
pub(crate) fn resolve_backend_exe(spec: &BackendSpec) -> Result<PathBuf, SpawnError> {
    // Strategy 1: explicit environment override
    if let Ok(env_path) = std::env::var("GANTRY_BACKEND_EXE") {
        return validate_executable(Path::new(&env_path));
    }

    // Strategy 2: bundled runtime next to the backend
    for candidate in BUNDLED_CANDIDATES {
        let path = spec.working_dir.join(candidate);
        if path.exists() {
            debug!(path = %path.display(), "using bundled backend runtime");
            return validate_executable(&path);
        }
    }

    // Strategy 3: system-wide fallback
    for candidate in SYSTEM_CANDIDATES {
        if probe_liveness(candidate) {
            debug!(%candidate, "using system backend runtime");
            return Ok(PathBuf::from(candidate));
        }
    }

    Err(SpawnError::ExecutableNotFound {
        path: spec.working_dir.clone(),
    })
}

/// Validate that a binary exists and is executable.
pub(crate) fn validate_executable(path: &Path) -> Result<PathBuf, SpawnError> {
    if !path.exists() {
        return Err(SpawnError::ExecutableNotFound {
            path: path.to_path_buf(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(metadata) => {
                let mode = metadata.permissions().mode();
                // Check if any execute bit is set (owner, group, or other)
                if mode & 0o111 == 0 {
                    return Err(SpawnError::NotExecutable {
                        path: path.to_path_buf(),
                    });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(SpawnError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(SpawnError::Io(e)),
        }
    }

    Ok(path.to_path_buf())
}

/// A trivial `--version` run; a candidate is only usable if it answers.
fn probe_liveness(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_path() {
        let missing = PathBuf::from("/nonexistent/path/to/python");
        let result = validate_executable(&missing);
        assert!(matches!(
            result,
            Err(SpawnError::ExecutableNotFound { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn validate_rejects_non_executable_file() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("python3");
        std::fs::write(&path, "#!/bin/sh\n").expect("write failed");

        let result = validate_executable(&path);
        assert!(matches!(result, Err(SpawnError::NotExecutable { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn validate_accepts_an_executable() {
        let result = validate_executable(Path::new("/bin/sh"));
        assert!(result.is_ok());
    }

    #[test]
    fn probe_rejects_nonsense_command() {
        assert!(!probe_liveness("definitely-not-a-real-binary"));
    }
}
