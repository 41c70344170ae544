//! Backup locations.
//!
//! A location is a root directory, either local or on `user@host`, holding
//! snapshot directories plus a handful of bookkeeping entries:
//!
//! ```text
//! <root>/backup.marker       location settings (see [`marker`])
//! <root>/backup.inprogress   pid of the running backup
//! <root>/latest              symlink to the newest completed snapshot
//! <root>/expired/            snapshots dropped by retention
//! <root>/YYYY-MM-DD-HHMMSS/  snapshots
//! ```

pub mod marker;

use crate::runner::{quote_path, CommandRunner};
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MARKER_FILE: &str = "backup.marker";
pub const INPROGRESS_FILE: &str = "backup.inprogress";
pub const LATEST_LINK: &str = "latest";
pub const EXPIRED_DIR: &str = "expired";

/// A resolved backup target.
#[derive(Debug, Clone)]
pub struct BackupLocation {
    root: PathBuf,
    runner: CommandRunner,
}

/// Split `user@host:path` into `("user@host", "path")`.
///
/// Anything that does not match that shape is a local path.
pub fn split_remote(address: &str) -> Option<(&str, &str)> {
    let (host, path) = address.split_once(':')?;
    let (user, hostname) = host.split_once('@')?;

    let user_ok = !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let host_ok = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".-".contains(c));

    (user_ok && host_ok && !path.is_empty()).then_some((host, path))
}

impl BackupLocation {
    /// Parse an address without touching the filesystem.
    pub fn parse(address: &str, ssh_options: &[String]) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(BackupError::InvalidArgument(
                "backup location must not be empty".to_string(),
            ));
        }

        let location = match split_remote(address) {
            Some((host, path)) => BackupLocation {
                root: PathBuf::from(path),
                runner: CommandRunner::remote(host, ssh_options.to_vec()),
            },
            None => BackupLocation {
                root: PathBuf::from(address),
                runner: CommandRunner::local(),
            },
        };
        Ok(location)
    }

    /// Parse an address and check that its root directory exists.
    ///
    /// The root is replaced by its absolute, symlink-free form so that paths
    /// derived from it stay valid whatever the working directory of the
    /// transfer tool is.
    pub async fn resolve(address: &str, ssh_options: &[String]) -> Result<Self> {
        let mut location = Self::parse(address, ssh_options)?;

        let output = location
            .runner
            .run(&format!("cd {} && pwd -P", quote_path(&location.root)))
            .await?;
        let canonical = output.stdout.trim();
        if !output.success() || canonical.is_empty() {
            return Err(BackupError::LocationNotFound(location.address()));
        }

        location.root = PathBuf::from(canonical);
        debug!(location = %location.address(), "Resolved backup location");
        Ok(location)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn host(&self) -> Option<&str> {
        self.runner.host()
    }

    pub fn is_remote(&self) -> bool {
        self.runner.is_remote()
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    pub fn inprogress_path(&self) -> PathBuf {
        self.root.join(INPROGRESS_FILE)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    pub fn expired_dir(&self) -> PathBuf {
        self.root.join(EXPIRED_DIR)
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn expired_path(&self, name: &str) -> PathBuf {
        self.expired_dir().join(name)
    }

    /// The location as the user would type it.
    pub fn address(&self) -> String {
        self.address_of(&self.root)
    }

    /// `path` prefixed with `user@host:` when the location is remote.
    pub fn address_of(&self, path: &Path) -> String {
        match self.host() {
            Some(host) => format!("{}:{}", host, path.display()),
            None => path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_remote() {
        assert_eq!(
            split_remote("backup@nas.local:/srv/backups"),
            Some(("backup@nas.local", "/srv/backups"))
        );
        assert_eq!(
            split_remote("first.last+x@host-1:relative/dir"),
            Some(("first.last+x@host-1", "relative/dir"))
        );
        assert_eq!(split_remote("/srv/backups"), None);
        assert_eq!(split_remote("nas:/srv/backups"), None);
        assert_eq!(split_remote("user@nas:"), None);
        assert_eq!(split_remote("@nas:/srv"), None);
        assert_eq!(split_remote("us er@nas:/srv"), None);
    }

    #[test]
    fn test_parse_derived_paths() {
        let location = BackupLocation::parse("backup@nas:/srv/b", &[]).unwrap();

        assert!(location.is_remote());
        assert_eq!(location.host(), Some("backup@nas"));
        assert_eq!(location.marker_path(), PathBuf::from("/srv/b/backup.marker"));
        assert_eq!(
            location.inprogress_path(),
            PathBuf::from("/srv/b/backup.inprogress")
        );
        assert_eq!(location.latest_path(), PathBuf::from("/srv/b/latest"));
        assert_eq!(
            location.expired_path("2024-01-01-000000"),
            PathBuf::from("/srv/b/expired/2024-01-01-000000")
        );
        assert_eq!(location.address(), "backup@nas:/srv/b");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            BackupLocation::parse("  ", &[]),
            Err(BackupError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_canonicalizes_local_root() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a");
        std::fs::create_dir(&nested).unwrap();

        let address = format!("{}/a/../a/", temp_dir.path().display());
        let location = BackupLocation::resolve(&address, &[]).await.unwrap();

        assert!(!location.is_remote());
        assert_eq!(location.root(), nested.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let address = temp_dir.path().join("missing").display().to_string();

        let err = BackupLocation::resolve(&address, &[]).await.unwrap_err();
        assert!(matches!(err, BackupError::LocationNotFound(_)));
    }
}
