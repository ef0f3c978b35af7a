//! Lock record path resolution.

use std::path::PathBuf;

use super::PathError;
use super::platform::data_root;

/// Returns the canonical location of the backend lock record.
///
/// Location: `<data_root>/backend.lock`. One slot per machine; the
/// supervisor overwrites it on every successful spawn and removes it on
/// clean stop.
pub fn lock_record_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("backend.lock"))
}
