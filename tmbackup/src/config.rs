//! Run configuration.
//!
//! A [`Config`] is assembled once per invocation from the command-line
//! [`RunOptions`] and the location's marker, then handed by reference to
//! every component. Nothing mutates it afterwards.

use crate::fs::naming::TimeBase;
use crate::location::marker::Marker;
use crate::utils::errors::{BackupError, Result};
use chrono::Duration;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub transfer: TransferConfig,

    /// Clock snapshot names are written in
    pub time_base: TimeBase,

    /// Age limits of the thinning tiers
    pub retention: RetentionWindows,

    /// Leave the expired area alone after a successful run
    pub keep_expired: bool,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Transfer tool binary
    pub program: PathBuf,

    /// Options forwarded to every ssh invocation
    pub ssh_options: Vec<String>,

    /// Pass `--verbose` to the transfer tool
    pub verbose: bool,
}

/// Settings known before the location has been looked at.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub verbose: bool,
    pub syslog: bool,
    pub keep_expired: bool,
    pub ssh_options: Vec<String>,
    pub rsync_program: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            syslog: false,
            keep_expired: false,
            ssh_options: Vec::new(),
            rsync_program: PathBuf::from(default_rsync_program()),
        }
    }
}

impl RunOptions {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Transfer settings, for commands that never read a marker.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            program: self.rsync_program.clone(),
            ssh_options: self.ssh_options.clone(),
            verbose: self.verbose,
        }
    }
}

/// Age windows of the retention tiers, youngest first.
///
/// A snapshot younger than `all` is always kept; younger than `hourly` one is
/// kept per hour, then one per 4 hours, one per 8 hours, one per day, and
/// one per month beyond `daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindows {
    pub all: Duration,
    pub hourly: Duration,
    pub four_hourly: Duration,
    pub eight_hourly: Duration,
    pub daily: Duration,
}

impl Default for RetentionWindows {
    fn default() -> Self {
        Self {
            all: Duration::hours(4),
            hourly: Duration::hours(24),
            four_hourly: Duration::days(3),
            eight_hourly: Duration::weeks(2),
            daily: Duration::weeks(4),
        }
    }
}

fn default_rsync_program() -> &'static str {
    "rsync"
}

impl Config {
    /// Combine command-line options with the settings stored in a marker.
    pub fn assemble(options: RunOptions, marker: &Marker) -> Result<Self> {
        Ok(Config {
            transfer: options.transfer_config(),
            time_base: marker.time_base(),
            retention: marker.retention_windows()?,
            keep_expired: options.keep_expired,
        })
    }
}

/// Parse a window such as `90m`, `4h`, `3d` or `2w`.
pub fn parse_window(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || BackupError::Config(format!("invalid retention window '{}'", value));

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let window = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    window.ok_or_else(invalid)
}

/// Render a window in the largest unit that divides it evenly.
pub fn format_window(window: Duration) -> String {
    let seconds = window.num_seconds();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if seconds != 0 && seconds % size == 0 {
            return format!("{}{}", seconds / size, unit);
        }
    }
    format!("{}s", seconds)
}
