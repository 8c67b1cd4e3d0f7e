// src/exec/kill.rs

//! Process tree termination.

use tracing::{debug, warn};

/// Kill a process and every descendant (best effort, fire-and-forget).
///
/// Task processes are spawned as leaders of their own process group, so on
/// unix the whole group gets `SIGKILL`.
#[cfg(unix)]
pub fn kill_process_tree(pid: u32) {
    let pgid = match libc::pid_t::try_from(pid) {
        Ok(pgid) if pgid > 0 => pgid,
        _ => {
            warn!(pid, "refusing to signal an invalid process group");
            return;
        }
    };

    // Negative pid addresses the process group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        debug!(pid, error = %err, "kill of process group failed");
    } else {
        debug!(pid, "sent SIGKILL to process group");
    }
}

/// Kill a process and every descendant (best effort, fire-and-forget).
#[cfg(not(unix))]
pub fn kill_process_tree(pid: u32) {
    let spawned = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();

    match spawned {
        Ok(_) => debug!(pid, "taskkill started"),
        Err(err) => warn!(pid, error = %err, "failed to start taskkill"),
    }
}
