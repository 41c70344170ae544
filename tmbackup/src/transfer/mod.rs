//! rsync invocations.
//!
//! A backup transfer mirrors the source into a snapshot directory,
//! hard-linking unchanged files against the previous snapshot. Its itemized
//! output is relayed to the log as it arrives; its `--log-file` goes to a
//! temporary file that is read back afterwards to diagnose failures and is
//! deleted when the transfer finishes or is abandoned.

pub mod output;

use crate::config::TransferConfig;
use crate::location::{split_remote, BackupLocation};
use crate::runner::CommandRunner;
use crate::utils::errors::{BackupError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// rsync: "partial transfer due to vanished source files"
const STATUS_VANISHED: i32 = 24;

/// What to transfer where.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Local directory whose content is backed up
    pub source: &'a Path,
    pub location: &'a BackupLocation,
    /// Target snapshot name
    pub snapshot: &'a str,
    /// Snapshot to hard-link unchanged files against
    pub link_dest: Option<&'a str>,
    pub exclude_file: Option<&'a Path>,
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub status: i32,
    /// rsync log file followed by its stderr
    pub log: String,
}

impl TransferOutcome {
    /// Files vanishing from the source mid-transfer is normal on a live system.
    pub fn success(&self) -> bool {
        self.status == 0 || self.status == STATUS_VANISHED
    }

    pub fn device_full(&self) -> bool {
        output::is_device_full(&self.log)
    }

    /// Last meaningful lines of the log, for error reports.
    pub fn summary(&self) -> String {
        let lines: Vec<&str> = self
            .log
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        lines[lines.len().saturating_sub(3)..].join("; ")
    }
}

/// rsync arguments for a backup transfer.
pub fn backup_args(
    request: &TransferRequest<'_>,
    config: &TransferConfig,
    log_file: &Path,
) -> Vec<String> {
    let location = request.location;
    let mut args = Vec::new();

    if location.is_remote() {
        args.push("-e".to_string());
        args.push(location.runner().ssh_command());
    }

    args.extend(
        [
            "--archive",
            "--hard-links",
            "--numeric-ids",
            "--delete",
            "--delete-excluded",
            "--one-file-system",
            "--itemize-changes",
            "--human-readable",
        ]
        .map(String::from),
    );
    args.push(format!("--log-file={}", log_file.display()));

    if config.verbose {
        args.push("--verbose".to_string());
    }
    if let Some(exclude_file) = request.exclude_file {
        args.push(format!("--exclude-from={}", exclude_file.display()));
    }
    if let Some(previous) = request.link_dest {
        // interpreted on the receiving side, hence the bare path
        args.push(format!(
            "--link-dest={}",
            location.snapshot_path(previous).display()
        ));
    }

    args.push("--".to_string());
    args.push(format!("{}/", request.source.display()));
    args.push(format!(
        "{}/",
        location.address_of(&location.snapshot_path(request.snapshot))
    ));
    args
}

/// Run one backup transfer to completion.
///
/// A non-zero status is not an error here: the caller decides between
/// retrying and giving up from the returned outcome.
pub async fn run(request: &TransferRequest<'_>, config: &TransferConfig) -> Result<TransferOutcome> {
    let log_file = tempfile::Builder::new()
        .prefix("tmbackup-rsync-")
        .suffix(".log")
        .tempfile()?;
    let args = backup_args(request, config, log_file.path());
    debug!(program = %config.program.display(), "rsync {}", args.join(" "));

    let mut child = Command::new(&config.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BackupError::TransferFailure {
            status: -1,
            message: format!("cannot start {}: {}", config.program.display(), e),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let relay = async {
        if let Some(stdout) = stdout {
            for_each_line(stdout, |line| {
                if !output::is_noise(line) {
                    info!("{}", line);
                }
            })
            .await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let collect = async {
        let mut text = String::new();
        if let Some(stderr) = stderr {
            for_each_line(stderr, |line| {
                warn!("{}", line);
                text.push_str(line);
                text.push('\n');
            })
            .await?;
        }
        Ok::<_, std::io::Error>(text)
    };

    let (relayed, errors, status) = tokio::join!(relay, collect, child.wait());
    relayed?;
    let errors = errors?;
    let status = status?.code().unwrap_or(-1);

    // rsync may die before it ever opens the log file
    let mut log = tokio::fs::read_to_string(log_file.path())
        .await
        .unwrap_or_default();
    log.push_str(&errors);

    debug!(status, "rsync finished");
    Ok(TransferOutcome { status, log })
}

/// Itemized differences between two backups, as rsync sees them.
///
/// Either side may be a `user@host:path` address; at most one can be
/// remote, as with any rsync invocation.
pub async fn compare(first: &str, second: &str, config: &TransferConfig) -> Result<Vec<String>> {
    let mut args = Vec::new();
    if let Some((host, _)) = split_remote(first).or_else(|| split_remote(second)) {
        args.push("-e".to_string());
        args.push(CommandRunner::remote(host, config.ssh_options.clone()).ssh_command());
    }
    args.extend(
        ["--dry-run", "--archive", "--itemize-changes", "--delete", "--"].map(String::from),
    );
    args.push(with_trailing_slash(first));
    args.push(with_trailing_slash(second));
    debug!(program = %config.program.display(), "rsync {}", args.join(" "));

    let output = Command::new(&config.program)
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| BackupError::TransferFailure {
            status: -1,
            message: format!("cannot start {}: {}", config.program.display(), e),
        })?;

    let status = output.status.code().unwrap_or(-1);
    if status != 0 {
        return Err(BackupError::TransferFailure {
            status,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !output::is_diff_noise(line))
        .map(str::to_string)
        .collect())
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Feed every line of `reader` to `f`. File names need not be UTF-8.
async fn for_each_line<R, F>(reader: R, mut f: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Some(segment) = segments.next_segment().await? {
        f(String::from_utf8_lossy(&segment).trim_end_matches('\r'));
    }
    Ok(())
}
