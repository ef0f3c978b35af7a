//! Platform termination strategies for the backend process.
//!
//! One capability, two entry points: [`shutdown_child`] when we own the
//! `Child` handle, [`terminate_pid`] when only a recorded pid is left. The
//! strategy is selected per platform: signal escalation where signals are
//! reliable, forceful tree-kill where they are not.

mod child;
mod pid;

pub use child::shutdown_child;
pub use pid::terminate_pid;
