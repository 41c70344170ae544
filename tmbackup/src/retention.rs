//! Tiered snapshot retention.
//!
//! Snapshots are scanned newest first. Each one falls into a tier by its age
//! relative to the reference time (the snapshot being created, not the wall
//! clock):
//!
//! | Age                 | Tier         | Kept                         |
//! |---------------------|--------------|------------------------------|
//! | < `all`             | All          | always                       |
//! | < `hourly`          | Hourly       | one per (day, hour)          |
//! | < `four_hourly`     | FourHourly   | one per (day, hour / 4)      |
//! | < `eight_hourly`    | EightHourly  | one per (day, hour / 8)      |
//! | < `daily`           | Daily        | one per day                  |
//! | older               | Monthly      | one per month                |
//!
//! A snapshot is expired when it shares its tier's bucket with the snapshot
//! scanned just before it, whether that one was kept or not. The first
//! snapshot has nothing before it and is always kept.

use crate::config::{Config, RetentionWindows};
use crate::fs::naming::{parse_snapshot_name, TimeBase};
use crate::fs::snapshots::SnapshotStore;
use crate::utils::errors::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    All,
    Hourly,
    FourHourly,
    EightHourly,
    Daily,
    Monthly,
}

impl Tier {
    pub fn for_age(age: Duration, windows: &RetentionWindows) -> Tier {
        if age < windows.all {
            Tier::All
        } else if age < windows.hourly {
            Tier::Hourly
        } else if age < windows.four_hourly {
            Tier::FourHourly
        } else if age < windows.eight_hourly {
            Tier::EightHourly
        } else if age < windows.daily {
            Tier::Daily
        } else {
            Tier::Monthly
        }
    }

    /// Bucket of `ts` at this tier's granularity as (year, month, day, slot).
    ///
    /// `All` does not thin and has no buckets.
    pub fn bucket(&self, ts: NaiveDateTime) -> Option<(i32, u32, u32, u32)> {
        let (year, month, day, hour) = (ts.year(), ts.month(), ts.day(), ts.hour());
        match self {
            Tier::All => None,
            Tier::Hourly => Some((year, month, day, hour)),
            Tier::FourHourly => Some((year, month, day, hour / 4)),
            Tier::EightHourly => Some((year, month, day, hour / 8)),
            Tier::Daily => Some((year, month, day, 0)),
            Tier::Monthly => Some((year, month, 0, 0)),
        }
    }
}

/// Outcome for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub name: String,
    pub tier: Tier,
    pub expire: bool,
}

/// Classify `snapshots` against `reference`.
///
/// Names that do not parse are reported and left out of the result; they
/// neither expire nor count as the previous snapshot.
pub fn plan(
    snapshots: &[String],
    reference: DateTime<Utc>,
    time_base: TimeBase,
    windows: &RetentionWindows,
) -> Vec<Decision> {
    let mut ordered: Vec<&String> = snapshots.iter().collect();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    let mut previous: Option<NaiveDateTime> = None;
    let mut decisions = Vec::with_capacity(ordered.len());

    for name in ordered {
        let ts = match parse_snapshot_name(name) {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Skipping snapshot during expiration: {}", e);
                continue;
            }
        };
        let Some(instant) = time_base.instant(ts) else {
            warn!(snapshot = %name, "Skipping snapshot with a nonexistent local time");
            continue;
        };

        let tier = Tier::for_age(reference - instant, windows);
        let expire = match tier.bucket(ts) {
            None => false,
            Some(bucket) => previous.and_then(|p| tier.bucket(p)) == Some(bucket),
        };
        previous = Some(ts);

        debug!(snapshot = %name, ?tier, expire, "Retention decision");
        decisions.push(Decision {
            name: name.clone(),
            tier,
            expire,
        });
    }

    decisions
}

/// Names of the snapshots to expire, newest first.
pub fn select_expired(
    snapshots: &[String],
    reference: DateTime<Utc>,
    time_base: TimeBase,
    windows: &RetentionWindows,
) -> Vec<String> {
    plan(snapshots, reference, time_base, windows)
        .into_iter()
        .filter(|d| d.expire)
        .map(|d| d.name)
        .collect()
}

/// Move every active snapshot the policy drops into the expired area.
pub async fn expire(
    store: &SnapshotStore<'_>,
    reference: DateTime<Utc>,
    config: &Config,
) -> Result<Vec<String>> {
    let active = store.list_active().await?;
    let expired = select_expired(&active, reference, config.time_base, &config.retention);

    for name in &expired {
        store.move_to_expired(name).await?;
    }
    Ok(expired)
}
