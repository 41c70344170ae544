//! tmbackup library
//!
//! Time-Machine-style backups on top of rsync: one hard-linked snapshot
//! directory per run, thinned out by a tiered retention policy, on a local
//! path or a `user@host:path` location reached over ssh.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod location;
pub mod retention;
pub mod runner;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{BackupError, Result};
