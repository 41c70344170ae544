//! Logging configuration using tracing.

use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tag under which records show up in the system log.
const SYSLOG_TAG: &str = "tmbackup";

/// Initialize logging with the specified level.
///
/// With `syslog` set, every record is also written to the stdin of a
/// `logger -t tmbackup` child. The pipe is closed when the process exits.
pub fn init(level: &str, syslog: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let syslog_layer = if syslog {
        let mut child = Command::new("logger")
            .args(["-t", SYSLOG_TAG])
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start logger: {}", e))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("logger stdin unavailable"))?;

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(stdin))
                .with_ansi(false)
                .with_target(false)
                .without_time(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(syslog_layer)
        .try_init()?;

    Ok(())
}
