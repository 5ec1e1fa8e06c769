//! Platform-aware forced termination of a spawned tool.

use tokio::process::Child;
use tracing::{debug, warn};

/// Forcefully stop `child` and everything it spawned where the platform
/// allows it.
///
/// On Windows killing the direct child leaves grandchildren running, so the
/// whole tree is taken down by PID with `taskkill /T /F`, awaited without
/// blocking the runtime. Elsewhere SIGKILL is sent straight to the child.
/// Does not wait for the child itself; reap it with `wait()` afterwards.
pub async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        debug!("terminate: process already reaped");
        return;
    };

    #[cfg(windows)]
    {
        let killed_tree = match tree_kill(pid) {
            Ok(mut taskkill) => taskkill.wait().await.map(|s| s.success()).unwrap_or(false),
            Err(_) => false,
        };
        if killed_tree {
            debug!(pid, "terminated process tree");
            return;
        }
        warn!(pid, "taskkill failed, falling back to direct kill");
    }

    kill(child, pid);
}

/// Synchronous variant for `Drop`: starts the tree kill without waiting for
/// it, then signals the child.
pub(crate) fn terminate_detached(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    #[cfg(windows)]
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            if let Err(e) = tree_kill(pid) {
                warn!(pid, error = %e, "failed to start taskkill");
            }
        }
    }

    kill(child, pid);
}

#[cfg(windows)]
fn tree_kill(pid: u32) -> std::io::Result<Child> {
    tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
}

fn kill(child: &mut Child, pid: u32) {
    match child.start_kill() {
        Ok(()) => debug!(pid, "sent kill signal"),
        Err(e) => warn!(pid, error = %e, "failed to kill process"),
    }
}
