//! Utility modules for tmbackup.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
