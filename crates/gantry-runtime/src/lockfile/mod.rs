//! Single-slot lock record guarding the backend singleton.
//!
//! The lock record is the one piece of cross-process shared state in the
//! supervision layer. Access is read-check-then-write without an OS mutex;
//! the narrow race window on simultaneous host launches is accepted as
//! best-effort rather than a strict mutual-exclusion guarantee.

mod io;
mod sweep;
mod verify;

pub use io::{LockFile, LockRecordError};
pub use sweep::{SweepOutcome, sweep_stale_backend};
pub use verify::{is_recorded_backend, pid_exists};
