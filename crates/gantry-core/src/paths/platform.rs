//! Platform-specific path detection and resolution.

use std::env;
use std::fs;
use std::path::PathBuf;

use super::error::PathError;

/// Get the root directory for gantry's persisted state (the lock record).
///
/// Resolution order:
/// 1. `GANTRY_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/gantry`)
pub fn data_root() -> Result<PathBuf, PathError> {
    // 1. Runtime override (highest priority)
    if let Ok(path) = env::var("GANTRY_DATA_DIR") {
        return Ok(PathBuf::from(path));
    }

    // 2. Default to system data directory
    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;

    let root = data_dir.join("gantry");

    // Ensure it exists
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| PathError::CreateFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(root)
}
