//! Process verification to ensure a recorded pid still belongs to our
//! backend before it is killed.

use gantry_core::ProcessRecord;

/// Check if a pid still looks like the backend described by `record`.
///
/// # Platform behavior
/// - **Linux**: reads `/proc/<pid>/cmdline` and requires both the recorded
///   command name and the first recorded argument to appear in it
/// - **macOS**: inspects the process table via `sysinfo` with the same rule
/// - **Other**: always returns `false` (conservative)
///
/// # Safety
/// Returns `false` if verification fails or the command line does not
/// match. This prevents accidentally killing unrelated processes that
/// reused the recorded pid.
pub fn is_recorded_backend(record: &ProcessRecord) -> bool {
    #[cfg(target_os = "linux")]
    {
        is_recorded_backend_linux(record)
    }

    #[cfg(target_os = "macos")]
    {
        is_recorded_backend_macos(record)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = record;
        false
    }
}

fn cmdline_matches(record: &ProcessRecord, cmdline: &str) -> bool {
    if !cmdline.contains(record.command_name()) {
        return false;
    }
    match record.args.first() {
        Some(first_arg) => cmdline.contains(first_arg.as_str()),
        None => true,
    }
}

#[cfg(target_os = "linux")]
fn is_recorded_backend_linux(record: &ProcessRecord) -> bool {
    let proc_cmdline = format!("/proc/{}/cmdline", record.pid);
    let Ok(raw) = std::fs::read(&proc_cmdline) else {
        return false;
    };

    // cmdline is NUL-separated
    let cmdline = raw
        .split(|byte| *byte == 0)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");

    cmdline_matches(record, &cmdline)
}

#[cfg(target_os = "macos")]
fn is_recorded_backend_macos(record: &ProcessRecord) -> bool {
    use sysinfo::System;

    // Use new_all() to ensure processes are loaded
    let sys = System::new_all();

    let Some(process) = sys.process(sysinfo::Pid::from_u32(record.pid)) else {
        return false;
    };

    let cmdline = process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    cmdline_matches(record, &cmdline)
}

/// Check if a pid exists (without verifying it's our process).
///
/// Uses `kill` with the null signal, which checks existence without
/// delivering anything.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false, // No such process
        Err(_) => true, // Process exists but we lack permission
    }
}

#[cfg(not(unix))]
pub fn pid_exists(_pid: u32) -> bool {
    false // Not implemented on non-Unix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn pid_exists_for_self() {
        let self_pid = std::process::id();
        assert!(pid_exists(self_pid));
    }

    #[test]
    #[cfg(unix)]
    fn pid_exists_false_for_impossible_pid() {
        assert!(!pid_exists(999_999));
    }

    #[test]
    fn unrelated_record_is_not_verified_for_self() {
        // Current process is not a python backend
        let record = ProcessRecord::new(
            std::process::id(),
            "python3",
            vec!["main.py".into()],
            "/srv/backend",
        );
        assert!(!is_recorded_backend(&record));
    }

    #[test]
    fn cmdline_rule_requires_command_and_entry_arg() {
        let record = ProcessRecord::new(1, "/usr/bin/python3", vec!["main.py".into()], "/srv");
        assert!(cmdline_matches(&record, "/usr/bin/python3 main.py"));
        assert!(!cmdline_matches(&record, "/usr/bin/python3 other.py"));
        assert!(!cmdline_matches(&record, "/usr/bin/node main.py"));
    }
}
