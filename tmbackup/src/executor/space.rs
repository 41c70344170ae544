//! Making room on a full backup device.

use crate::fs::SnapshotStore;
use crate::utils::errors::{BackupError, Result};
use tracing::warn;

/// What was given up to free space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reclaimed {
    /// The expired area was emptied
    Purged(Vec<String>),
    /// Nothing was expired, so the oldest snapshot went
    Evicted { snapshot: String, purged: Vec<String> },
}

/// Free space after a transfer into `target` hit a full device.
///
/// Expired snapshots go first. Failing that, the oldest completed snapshot
/// is sacrificed, as long as another completed one remains to serve as the
/// incremental base. With nothing left to give up the run fails.
pub async fn reclaim(store: &SnapshotStore<'_>, target: &str) -> Result<Reclaimed> {
    if !store.list_expired().await?.is_empty() {
        warn!("No space left on device, deleting expired snapshots");
        return Ok(Reclaimed::Purged(store.purge_expired().await?));
    }

    let completed: Vec<String> = store
        .list_active()
        .await?
        .into_iter()
        .filter(|name| name != target)
        .collect();

    let oldest = match completed.as_slice() {
        [_, .., oldest] => oldest.clone(),
        _ => {
            return Err(BackupError::InsufficientSpace(format!(
                "no space left on {} and no snapshot left to delete",
                store.location().address()
            )))
        }
    };

    warn!(snapshot = %oldest, "No space left on device, deleting oldest snapshot");
    store.move_to_expired(&oldest).await?;
    let purged = store.purge_expired().await?;
    Ok(Reclaimed::Evicted {
        snapshot: oldest,
        purged,
    })
}
