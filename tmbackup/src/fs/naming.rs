//! Snapshot names and the time base they are written in.
//!
//! A snapshot is identified by a fixed-width `YYYY-MM-DD-HHMMSS` directory
//! name, so lexicographic order is chronological order.

use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// chrono format of a snapshot directory name
pub const SNAPSHOT_FORMAT: &str = "%Y-%m-%d-%H%M%S";

const SNAPSHOT_NAME_LEN: usize = 17;

/// Clock a location's snapshot names are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    Utc,
    Local,
}

impl TimeBase {
    pub fn from_use_utc(use_utc: bool) -> Self {
        if use_utc {
            TimeBase::Utc
        } else {
            TimeBase::Local
        }
    }

    pub fn is_utc(&self) -> bool {
        matches!(self, TimeBase::Utc)
    }

    /// Wall-clock reading of `instant` in this time base
    pub fn naive(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            TimeBase::Utc => instant.naive_utc(),
            TimeBase::Local => instant.with_timezone(&Local).naive_local(),
        }
    }

    /// Absolute instant of a wall-clock reading.
    ///
    /// Returns `None` for local times that fall into a DST gap.
    pub fn instant(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            TimeBase::Utc => Some(naive.and_utc()),
            TimeBase::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Does `name` have the exact `YYYY-MM-DD-HHMMSS` shape?
///
/// This only checks the shape; `2024-13-45-999999` passes and is rejected
/// later by [`parse_snapshot_name`].
pub fn is_snapshot_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == SNAPSHOT_NAME_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 | 10 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Parse a snapshot directory name into its wall-clock timestamp.
pub fn parse_snapshot_name(name: &str) -> Result<NaiveDateTime> {
    if !is_snapshot_name(name) {
        return Err(BackupError::DateParse(name.to_string()));
    }
    NaiveDateTime::parse_from_str(name, SNAPSHOT_FORMAT)
        .map_err(|e| BackupError::DateParse(format!("{}: {}", name, e)))
}

/// Directory name for a snapshot taken at `timestamp`.
pub fn snapshot_name(timestamp: NaiveDateTime) -> String {
    timestamp.format(SNAPSHOT_FORMAT).to_string()
}
