//! Snapshot directories under a backup root.
//!
//! Every mutation is a single shell command run through the location's
//! [`CommandRunner`](crate::runner::CommandRunner), and every move is a
//! plain `mv` inside one filesystem, i.e. an atomic rename.

use super::naming::is_snapshot_name;
use crate::location::BackupLocation;
use crate::runner::quote_path;
use crate::utils::errors::Result;
use std::path::Path;
use tracing::{debug, info};

/// Snapshot operations on one location.
pub struct SnapshotStore<'a> {
    location: &'a BackupLocation,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(location: &'a BackupLocation) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &BackupLocation {
        self.location
    }

    /// Every entry of `dir`, or nothing if `dir` does not exist.
    async fn entries(&self, dir: &Path) -> Result<Vec<String>> {
        let dir = quote_path(dir);
        let output = self
            .location
            .runner()
            .run_checked(&format!("if [ -d {0} ]; then ls -1A {0}; fi", dir))
            .await?;

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Snapshot names in `dir`, newest first.
    async fn snapshots_in(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .entries(dir)
            .await?
            .into_iter()
            .filter(|name| is_snapshot_name(name))
            .collect();
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Active snapshots, newest first.
    pub async fn list_active(&self) -> Result<Vec<String>> {
        self.snapshots_in(self.location.root()).await
    }

    /// Expired snapshots, newest first.
    pub async fn list_expired(&self) -> Result<Vec<String>> {
        self.snapshots_in(&self.location.expired_dir()).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = quote_path(&self.location.snapshot_path(name));
        self.location.runner().test(&format!("test -d {}", path)).await
    }

    /// Create an empty active snapshot directory.
    pub async fn create(&self, name: &str) -> Result<()> {
        let path = quote_path(&self.location.snapshot_path(name));
        self.location
            .runner()
            .run_checked(&format!("mkdir -p -- {}", path))
            .await?;
        debug!(snapshot = %name, "Created snapshot directory");
        Ok(())
    }

    /// Rename an active snapshot.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = quote_path(&self.location.snapshot_path(from));
        let to_path = quote_path(&self.location.snapshot_path(to));
        self.location
            .runner()
            .run_checked(&format!("test ! -e {1} && mv -- {0} {1}", from_path, to_path))
            .await?;
        Ok(())
    }

    /// Move an active snapshot into the expired area.
    pub async fn move_to_expired(&self, name: &str) -> Result<()> {
        let expired_dir = quote_path(&self.location.expired_dir());
        let from = quote_path(&self.location.snapshot_path(name));
        let to = quote_path(&self.location.expired_path(name));
        self.location
            .runner()
            .run_checked(&format!(
                "mkdir -p -- {} && test ! -e {2} && mv -- {1} {2}",
                expired_dir, from, to
            ))
            .await?;
        info!(snapshot = %name, "Expired snapshot");
        Ok(())
    }

    /// Bring an expired snapshot back as the active snapshot `new_name`.
    ///
    /// Its content stays in place and becomes the starting point of the next
    /// transfer.
    pub async fn reuse_expired(&self, name: &str, new_name: &str) -> Result<()> {
        let from = quote_path(&self.location.expired_path(name));
        let to = quote_path(&self.location.snapshot_path(new_name));
        self.location
            .runner()
            .run_checked(&format!("test ! -e {1} && mv -- {0} {1}", from, to))
            .await?;
        info!(expired = %name, snapshot = %new_name, "Reusing expired snapshot");
        Ok(())
    }

    /// Delete everything under the expired area, then the area itself.
    ///
    /// Returns the deleted entries. Calling it on an empty or missing area
    /// does nothing.
    pub async fn purge_expired(&self) -> Result<Vec<String>> {
        let expired_dir = self.location.expired_dir();
        let runner = self.location.runner();
        let entries = self.entries(&expired_dir).await?;

        for entry in &entries {
            let path = quote_path(&expired_dir.join(entry));
            runner.run_checked(&format!("rm -rf -- {}", path)).await?;
            info!(snapshot = %entry, "Deleted expired snapshot");
        }

        let dir = quote_path(&expired_dir);
        runner
            .run_checked(&format!("if [ -d {0} ]; then rmdir -- {0}; fi", dir))
            .await?;
        Ok(entries)
    }

    /// Point `latest` at `name`.
    pub async fn update_latest(&self, name: &str) -> Result<()> {
        let link = quote_path(&self.location.latest_path());
        self.location
            .runner()
            .run_checked(&format!(
                "rm -f -- {0} && ln -s -- {1} {0}",
                link,
                quote_path(Path::new(name))
            ))
            .await?;
        debug!(snapshot = %name, "Updated latest link");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn local(temp_dir: &TempDir) -> BackupLocation {
        BackupLocation::resolve(&temp_dir.path().display().to_string(), &[])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_active_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["2024-01-02-000000", "2023-12-31-235959", "2024-01-01-120000"] {
            fs::create_dir(root.join(name)).unwrap();
        }
        fs::create_dir(root.join("expired")).unwrap();
        fs::create_dir(root.join("2024-01-03")).unwrap();
        fs::write(root.join("backup.marker"), "").unwrap();

        let location = local(&temp_dir).await;
        let store = SnapshotStore::new(&location);

        assert_eq!(
            store.list_active().await.unwrap(),
            vec!["2024-01-02-000000", "2024-01-01-120000", "2023-12-31-235959"]
        );
        assert!(store.list_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_rename() {
        let temp_dir = TempDir::new().unwrap();
        let location = local(&temp_dir).await;
        let store = SnapshotStore::new(&location);

        store.create("2024-01-01-000000").await.unwrap();
        assert!(store.exists("2024-01-01-000000").await.unwrap());

        store
            .rename("2024-01-01-000000", "2024-01-01-010000")
            .await
            .unwrap();
        assert_eq!(store.list_active().await.unwrap(), vec!["2024-01-01-010000"]);
    }

    #[tokio::test]
    async fn test_expire_and_reuse() {
        let temp_dir = TempDir::new().unwrap();
        let location = local(&temp_dir).await;
        let store = SnapshotStore::new(&location);

        store.create("2024-01-01-000000").await.unwrap();
        fs::write(temp_dir.path().join("2024-01-01-000000/data.txt"), b"payload").unwrap();

        store.move_to_expired("2024-01-01-000000").await.unwrap();
        assert!(store.list_active().await.unwrap().is_empty());
        assert_eq!(store.list_expired().await.unwrap(), vec!["2024-01-01-000000"]);

        store
            .reuse_expired("2024-01-01-000000", "2024-02-01-000000")
            .await
            .unwrap();
        assert_eq!(store.list_active().await.unwrap(), vec!["2024-02-01-000000"]);
        assert!(store.list_expired().await.unwrap().is_empty());
        assert_eq!(
            fs::read(temp_dir.path().join("2024-02-01-000000/data.txt")).unwrap(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn test_purge_expired_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let location = local(&temp_dir).await;
        let store = SnapshotStore::new(&location);

        for name in ["2024-01-01-000000", "2024-01-02-000000"] {
            store.create(name).await.unwrap();
            store.move_to_expired(name).await.unwrap();
        }
        fs::write(location.expired_dir().join("stray"), b"x").unwrap();

        let mut deleted = store.purge_expired().await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["2024-01-01-000000", "2024-01-02-000000", "stray"]);
        assert!(!location.expired_dir().exists());

        assert!(store.purge_expired().await.unwrap().is_empty());
        assert!(!location.expired_dir().exists());
    }

    #[tokio::test]
    async fn test_update_latest() {
        let temp_dir = TempDir::new().unwrap();
        let location = local(&temp_dir).await;
        let store = SnapshotStore::new(&location);

        store.create("2024-01-01-000000").await.unwrap();
        store.create("2024-01-02-000000").await.unwrap();

        store.update_latest("2024-01-01-000000").await.unwrap();
        store.update_latest("2024-01-02-000000").await.unwrap();

        let target = fs::read_link(location.latest_path()).unwrap();
        assert_eq!(target, Path::new("2024-01-02-000000"));
    }

    #[tokio::test]
    async fn test_paths_with_spaces() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("my backups");
        fs::create_dir(&root).unwrap();

        let location = BackupLocation::resolve(&root.display().to_string(), &[])
            .await
            .unwrap();
        let store = SnapshotStore::new(&location);

        store.create("2024-01-01-000000").await.unwrap();
        store.move_to_expired("2024-01-01-000000").await.unwrap();
        assert_eq!(store.list_expired().await.unwrap(), vec!["2024-01-01-000000"]);
    }
}
