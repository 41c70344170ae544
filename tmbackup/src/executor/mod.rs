//! Backup job executor - runs one backup from start to finish.
//!
//! A run goes through these steps, each of which leaves the location in a
//! state the next run can pick up from:
//!
//! 1. claim the location through the in-progress marker, resuming the
//!    newest snapshot if the previous run died;
//! 2. expire snapshots according to the retention policy;
//! 3. prepare the target directory, recycling an expired snapshot when one
//!    is available;
//! 4. transfer, freeing space and retrying while the device is full;
//! 5. point `latest` at the new snapshot, purge the expired area and
//!    release the marker.

pub mod space;

use crate::config::{Config, RunOptions};
use crate::daemon::inprogress::{self, MarkerState};
use crate::fs::{snapshot_name, SnapshotStore};
use crate::location::{marker, BackupLocation};
use crate::retention;
use crate::transfer::{self, TransferRequest};
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use space::Reclaimed;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Backup job configuration
#[derive(Debug, Clone)]
pub struct BackupJob {
    /// Local directory to back up
    pub source: PathBuf,
    /// Location address, local path or `user@host:path`
    pub destination: String,
    /// rsync exclude-pattern file
    pub exclude_file: Option<PathBuf>,
}

/// Backup execution result
#[derive(Debug, Clone, Default)]
pub struct BackupResult {
    /// Name of the completed snapshot
    pub snapshot: String,
    /// Interrupted snapshot that was continued, if any
    pub resumed: Option<String>,
    /// Expired snapshot recycled as the target, if any
    pub reused: Option<String>,
    /// Snapshot unchanged files were hard-linked against
    pub link_dest: Option<String>,
    /// Snapshots moved aside by retention
    pub expired: Vec<String>,
    /// Completed snapshots sacrificed to free space
    pub evicted: Vec<String>,
    /// Entries deleted from the expired area
    pub purged: Vec<String>,
    /// Transfer attempts, including the successful one
    pub attempts: u32,
    pub duration_secs: u64,
}

/// Main backup executor
pub struct BackupExecutor {
    options: RunOptions,
    pid: u32,
}

impl BackupExecutor {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            pid: std::process::id(),
        }
    }

    /// Execute a backup job
    pub async fn execute(&self, job: BackupJob) -> Result<BackupResult> {
        self.execute_at(job, Utc::now()).await
    }

    /// Execute a backup job as if it started at `now`.
    pub async fn execute_at(&self, job: BackupJob, now: DateTime<Utc>) -> Result<BackupResult> {
        let start_time = Instant::now();

        validate_job(&job).await?;
        let location = BackupLocation::resolve(&job.destination, &self.options.ssh_options).await?;
        let config = Config::assemble(self.options.clone(), &marker::import(&location).await?)?;
        let store = SnapshotStore::new(&location);

        let stamp = config.time_base.naive(now);
        let name = snapshot_name(stamp);
        let reference = config.time_base.instant(stamp).unwrap_or(now);

        info!(
            "Starting backup of {} into {}",
            job.source.display(),
            location.address_of(&location.snapshot_path(&name))
        );

        let mut result = BackupResult {
            snapshot: name.clone(),
            ..BackupResult::default()
        };

        result.resumed = self.claim(&store, &name).await?;
        result.expired = retention::expire(&store, reference, &config).await?;

        if !store.exists(&name).await? {
            match store.list_expired().await?.first() {
                Some(recycled) => {
                    store.reuse_expired(recycled, &name).await?;
                    result.reused = Some(recycled.clone());
                }
                None => store.create(&name).await?,
            }
        }

        result.link_dest = store
            .list_active()
            .await?
            .into_iter()
            .find(|snapshot| snapshot != &name);
        match &result.link_dest {
            Some(previous) => info!("Incremental backup against {}", previous),
            None => info!("No previous snapshot, running a full backup"),
        }

        let request = TransferRequest {
            source: &job.source,
            location: &location,
            snapshot: &name,
            link_dest: result.link_dest.as_deref(),
            exclude_file: job.exclude_file.as_deref(),
        };
        loop {
            result.attempts += 1;
            let outcome = transfer::run(&request, &config.transfer).await?;
            if outcome.success() {
                if outcome.status != 0 {
                    warn!("Some source files vanished during the transfer");
                }
                break;
            }
            if !outcome.device_full() {
                return Err(BackupError::TransferFailure {
                    status: outcome.status,
                    message: outcome.summary(),
                });
            }

            match space::reclaim(&store, &name).await? {
                Reclaimed::Purged(purged) => result.purged.extend(purged),
                Reclaimed::Evicted { snapshot, purged } => {
                    result.evicted.push(snapshot);
                    result.purged.extend(purged);
                }
            }
            info!("Retrying transfer (attempt {})", result.attempts + 1);
        }

        store.update_latest(&name).await?;
        if config.keep_expired {
            debug!("Keeping expired snapshots");
        } else {
            result.purged.extend(store.purge_expired().await?);
        }
        inprogress::remove(&location).await?;

        result.duration_secs = start_time.elapsed().as_secs();
        info!(
            "Backup completed: {} ({} expired, {} evicted, {} attempts, {}s)",
            name,
            result.expired.len(),
            result.evicted.len(),
            result.attempts,
            result.duration_secs
        );
        Ok(result)
    }

    /// Take the in-progress marker, returning the snapshot being resumed.
    async fn claim(&self, store: &SnapshotStore<'_>, name: &str) -> Result<Option<String>> {
        let location = store.location();
        let mut resumed = None;

        match inprogress::inspect(location).await? {
            MarkerState::Running(pid) => return Err(BackupError::AlreadyRunning(pid)),
            MarkerState::Interrupted(pid) => {
                warn!(?pid, "Previous backup failed or was interrupted, resuming");
                if let Some(last) = store.list_active().await?.into_iter().next() {
                    if last != name {
                        store.rename(&last, name).await?;
                    }
                    info!("Resuming {} as {}", last, name);
                    resumed = Some(last);
                }
            }
            MarkerState::Free => {}
        }

        inprogress::write(location, self.pid).await?;
        Ok(resumed)
    }
}

/// Check the local side of a job before touching the location.
async fn validate_job(job: &BackupJob) -> Result<()> {
    let is_dir = tokio::fs::metadata(&job.source)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(BackupError::LocationNotFound(format!(
            "source directory {}",
            job.source.display()
        )));
    }

    if let Some(exclude_file) = &job.exclude_file {
        let is_file = tokio::fs::metadata(exclude_file)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(BackupError::InvalidArgument(format!(
                "exclude file {} does not exist",
                exclude_file.display()
            )));
        }
    }
    Ok(())
}
