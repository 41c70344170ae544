//! The `backup.inprogress` marker.
//!
//! The file holds the pid of the process running a backup into the
//! location. It is the only crash and concurrency signal there is:
//!
//! - no file: nothing is running;
//! - file whose pid is alive: another backup is running;
//! - file whose pid is gone: the previous run died and should be resumed.
//!
//! This is advisory. A dead run whose pid has since been reused by an
//! unrelated process looks alive, and the pid is always checked on the
//! local machine even if the marker was written from another host.

use crate::location::BackupLocation;
use crate::runner::quote_path;
use crate::utils::errors::Result;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker
    Free,
    /// Marker owned by a live process
    Running(i32),
    /// Marker left behind by a process that is gone (pid unreadable: `None`)
    Interrupted(Option<i32>),
}

/// Whether a process with this pid exists on this machine.
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Look at the marker of `location`.
pub async fn inspect(location: &BackupLocation) -> Result<MarkerState> {
    let runner = location.runner();
    let path = quote_path(&location.inprogress_path());

    if !runner.test(&format!("test -e {}", path)).await? {
        return Ok(MarkerState::Free);
    }

    let output = runner.run_checked(&format!("cat {}", path)).await?;
    let state = match output.stdout.trim().parse::<i32>() {
        Ok(pid) if is_process_alive(pid) => MarkerState::Running(pid),
        Ok(pid) => MarkerState::Interrupted(Some(pid)),
        Err(_) => MarkerState::Interrupted(None),
    };
    debug!(?state, "In-progress marker found");
    Ok(state)
}

/// Claim the location for process `pid`, replacing any stale marker.
pub async fn write(location: &BackupLocation, pid: u32) -> Result<()> {
    let path = quote_path(&location.inprogress_path());
    location
        .runner()
        .run_checked(&format!("printf '%s\\n' {} > {}", pid, path))
        .await?;
    Ok(())
}

pub async fn remove(location: &BackupLocation) -> Result<()> {
    let path = quote_path(&location.inprogress_path());
    location
        .runner()
        .run_checked(&format!("rm -f -- {}", path))
        .await?;
    Ok(())
}
