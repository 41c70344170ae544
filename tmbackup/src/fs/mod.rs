//! Snapshot naming and the snapshot directory store.

pub mod naming;
pub mod snapshots;

pub use naming::{is_snapshot_name, parse_snapshot_name, snapshot_name, TimeBase};
pub use snapshots::SnapshotStore;
