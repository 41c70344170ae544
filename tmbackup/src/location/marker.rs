//! The `backup.marker` record.
//!
//! Its presence makes a directory a backup location; its content fixes the
//! time base and retention windows for the life of the location, whichever
//! machine runs the backup. The file is a flat TOML table and is only ever
//! parsed. An empty marker (a location created before settings were stored)
//! means local time and the built-in windows.

use super::BackupLocation;
use crate::config::{format_window, parse_window, RetentionWindows};
use crate::fs::naming::TimeBase;
use crate::runner::{quote, quote_path};
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Snapshot names are UTC (absent on legacy locations: local time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_utc: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_all: Option<String>,

    #[serde(default, rename = "retention_1h", skip_serializing_if = "Option::is_none")]
    pub retention_hourly: Option<String>,

    #[serde(default, rename = "retention_4h", skip_serializing_if = "Option::is_none")]
    pub retention_four_hourly: Option<String>,

    #[serde(default, rename = "retention_8h", skip_serializing_if = "Option::is_none")]
    pub retention_eight_hourly: Option<String>,

    #[serde(default, rename = "retention_24h", skip_serializing_if = "Option::is_none")]
    pub retention_daily: Option<String>,
}

impl Marker {
    /// Marker written by `init`: every setting spelled out.
    pub fn new(time_base: TimeBase) -> Self {
        let windows = RetentionWindows::default();
        Marker {
            use_utc: Some(time_base.is_utc()),
            retention_all: Some(format_window(windows.all)),
            retention_hourly: Some(format_window(windows.hourly)),
            retention_four_hourly: Some(format_window(windows.four_hourly)),
            retention_eight_hourly: Some(format_window(windows.eight_hourly)),
            retention_daily: Some(format_window(windows.daily)),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn render(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BackupError::Config(e.to_string()))
    }

    pub fn time_base(&self) -> TimeBase {
        TimeBase::from_use_utc(self.use_utc.unwrap_or(false))
    }

    /// Windows from the marker, built-in defaults for missing keys.
    pub fn retention_windows(&self) -> Result<RetentionWindows> {
        let defaults = RetentionWindows::default();
        let window = |value: &Option<String>, default| match value {
            Some(v) => parse_window(v),
            None => Ok(default),
        };

        Ok(RetentionWindows {
            all: window(&self.retention_all, defaults.all)?,
            hourly: window(&self.retention_hourly, defaults.hourly)?,
            four_hourly: window(&self.retention_four_hourly, defaults.four_hourly)?,
            eight_hourly: window(&self.retention_eight_hourly, defaults.eight_hourly)?,
            daily: window(&self.retention_daily, defaults.daily)?,
        })
    }
}

/// Check that `location` carries a marker we can write to.
pub async fn check(location: &BackupLocation) -> Result<()> {
    let runner = location.runner();
    let marker = quote_path(&location.marker_path());

    if !runner.test(&format!("test -f {}", marker)).await? {
        return Err(BackupError::NotABackupLocation(location.address()));
    }
    if !runner.test(&format!("touch {}", marker)).await? {
        return Err(BackupError::PermissionDenied(
            location.address_of(&location.marker_path()),
        ));
    }
    Ok(())
}

/// Load the location's marker.
pub async fn import(location: &BackupLocation) -> Result<Marker> {
    check(location).await?;
    let output = location
        .runner()
        .run_checked(&format!("cat {}", quote_path(&location.marker_path())))
        .await?;
    Marker::parse(&output.stdout)
}

/// Turn an existing directory into a backup location.
///
/// Refuses to touch a location that already has a marker.
pub async fn init(location: &BackupLocation, time_base: TimeBase) -> Result<Marker> {
    let runner = location.runner();
    let path = quote_path(&location.marker_path());

    if runner.test(&format!("test -e {}", path)).await? {
        return Err(BackupError::AlreadyInitialized(location.address()));
    }

    let marker = Marker::new(time_base);
    let write = format!("set -C; printf '%s' {} > {}", quote(&marker.render()?), path);
    let output = runner.run(&write).await?;
    if !output.success() {
        // noclobber lost a race against another init
        if runner.test(&format!("test -e {}", path)).await? {
            return Err(BackupError::AlreadyInitialized(location.address()));
        }
        return Err(BackupError::PermissionDenied(format!(
            "{}: {}",
            location.address_of(&location.marker_path()),
            output.stderr.trim()
        )));
    }

    info!(
        location = %location.address(),
        utc = time_base.is_utc(),
        "Backup location initialized"
    );
    Ok(marker)
}
