//! SIGINT and SIGTERM handling.
//!
//! An interrupted run is abandoned by dropping its future: the rsync child
//! is killed on drop and its temporary log file deleted. The in-progress
//! marker is left in place, so the next run resumes the snapshot.

use crate::utils::errors::{BackupError, Result};
use std::future::Future;
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tracing::warn;

/// Wait for SIGINT or SIGTERM and return its name.
pub async fn wait_for_signal() -> Result<&'static str> {
    let mut terminate = signal::unix::signal(SignalKind::terminate())?;

    let name = tokio::select! {
        received = signal::ctrl_c() => {
            received?;
            "SIGINT"
        }
        _ = terminate.recv() => "SIGTERM",
    };

    warn!("Received {}, aborting", name);
    Ok(name)
}

/// Drive `work` to completion unless a signal arrives first.
pub async fn run_until_signal<F, T>(work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = work => result,
        signal = wait_for_signal() => Err(BackupError::Interrupted(signal?.to_string())),
    }
}
