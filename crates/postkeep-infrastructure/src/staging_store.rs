//! File-backed staging store.
//!
//! Snapshots live in `staging/<file stem>.json` and are replaced whole through
//! an atomic rename, so a concurrent `read` sees either the previous snapshot or
//! the new one.
//!
//! A store holds a lease (`<file stem>.lease`) on every snapshot it writes until
//! it deletes the snapshot or is dropped. Startup purge only removes snapshots
//! nobody holds, so a second process never clears a live session's snapshot.

use crate::storage::{AtomicJsonError, AtomicJsonFile, FileLease, run_blocking};
use async_trait::async_trait;
use postkeep_core::session::SessionKey;
use postkeep_core::staging::{StagingSnapshot, StagingStore};
use postkeep_core::{PostkeepError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// What to do with snapshots found at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPolicy {
    /// Delete snapshots left by earlier runs that no live process holds.
    Purge,
    /// Keep them (recovery tooling).
    Preserve,
}

impl StartupPolicy {
    pub fn from_purge_flag(purge_on_start: bool) -> Self {
        if purge_on_start {
            StartupPolicy::Purge
        } else {
            StartupPolicy::Preserve
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStagingStore {
    staging_dir: PathBuf,
    leases: Arc<Mutex<HashMap<SessionKey, FileLease>>>,
}

impl FileStagingStore {
    /// Opens the staging directory, applying `policy` to leftover snapshots.
    pub async fn new(staging_dir: impl AsRef<Path>, policy: StartupPolicy) -> Result<Self> {
        let staging_dir = staging_dir.as_ref().to_path_buf();
        fs::create_dir_all(&staging_dir).await?;

        let store = Self {
            staging_dir,
            leases: Arc::new(Mutex::new(HashMap::new())),
        };
        if policy == StartupPolicy::Purge {
            let purged = store.purge().await?;
            if purged > 0 {
                tracing::info!("[Staging] Cleared {} snapshot(s) from earlier runs", purged);
            }
        }
        Ok(store)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn snapshot_path(&self, key: &SessionKey) -> PathBuf {
        self.staging_dir.join(format!("{}.json", key.file_stem()))
    }

    fn file(&self, key: &SessionKey) -> AtomicJsonFile<StagingSnapshot> {
        AtomicJsonFile::new(self.snapshot_path(key))
    }

    /// Removes unleased snapshots, returning how many were removed.
    ///
    /// Hidden files (in-flight `.tmp` writes) and lock files are left alone.
    async fn purge(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.staging_dir).await?;
        let mut removed = 0;
        let mut live = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !is_snapshot_file(&path) {
                continue;
            }

            let purged = run_blocking(move || {
                let Some(lease) = FileLease::try_acquire(&path)? else {
                    return Ok(false);
                };
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                lease.release_and_remove();
                Ok(true)
            })
            .await?;

            if purged {
                removed += 1;
            } else {
                live += 1;
            }
        }

        if live > 0 {
            tracing::debug!("[Staging] Kept {} snapshot(s) held by a running session", live);
        }
        Ok(removed)
    }

    /// Leases the snapshot for `key` unless this store already holds it.
    async fn hold_lease(&self, key: &SessionKey) -> Result<()> {
        let mut leases = self.leases.lock().await;
        if leases.contains_key(key) {
            return Ok(());
        }

        let path = self.snapshot_path(key);
        let lease = run_blocking(move || FileLease::try_acquire(&path).map_err(PostkeepError::from))
            .await?;
        match lease {
            Some(lease) => {
                leases.insert(key.clone(), lease);
            }
            None => tracing::warn!("[Staging] Snapshot for {} is held by another process", key),
        }
        Ok(())
    }

    /// Drops this store's lease on `key`, or an orphaned one left by a dead process.
    async fn release_lease(&self, key: &SessionKey) {
        let held = self.leases.lock().await.remove(key);
        let path = self.snapshot_path(key);
        let released = run_blocking(move || {
            let lease = match held {
                Some(lease) => Some(lease),
                None => FileLease::try_acquire(&path)?,
            };
            if let Some(lease) = lease {
                lease.release_and_remove();
            }
            Ok(())
        })
        .await;
        if let Err(e) = released {
            tracing::debug!("[Staging] Could not release lease for {}: {}", key, e);
        }
    }

    async fn load_lenient(file: AtomicJsonFile<StagingSnapshot>) -> Result<Option<StagingSnapshot>> {
        run_blocking(move || match file.load() {
            Ok(snapshot) => Ok(snapshot),
            Err(AtomicJsonError::JsonError(e)) => {
                tracing::warn!(
                    "[Staging] Ignoring unreadable snapshot {}: {}",
                    file.path().display(),
                    e
                );
                Ok(None)
            }
            Err(e) => Err(PostkeepError::from(e)),
        })
        .await
    }
}

#[async_trait]
impl StagingStore for FileStagingStore {
    async fn write(&self, snapshot: &StagingSnapshot) -> Result<()> {
        self.hold_lease(&snapshot.key()).await?;
        let file = self.file(&snapshot.key());
        let snapshot = snapshot.clone();
        let count = snapshot.records.len();
        run_blocking(move || file.save(&snapshot).map_err(PostkeepError::from)).await?;
        tracing::debug!("[Staging] Snapshot written ({} raw records)", count);
        Ok(())
    }

    async fn read(&self, key: &SessionKey) -> Result<Option<StagingSnapshot>> {
        Self::load_lenient(self.file(key)).await
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        match fs::remove_file(self.snapshot_path(key)).await {
            Ok(()) => tracing::debug!("[Staging] Deleted snapshot for {}", key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.release_lease(key).await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StagingSnapshot>> {
        let mut entries = fs::read_dir(&self.staging_dir).await?;
        let mut snapshots = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_snapshot_file(&path) {
                continue;
            }
            if let Some(snapshot) = Self::load_lenient(AtomicJsonFile::new(path)).await? {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by(|a, b| b.written_at.cmp(&a.written_at));
        Ok(snapshots)
    }
}

/// Visible `.json` files; temp files start with a dot.
fn is_snapshot_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .map(|name| !name.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    visible && path.extension().and_then(|e| e.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use postkeep_core::record::RawRecord;
    use postkeep_core::session::{Origin, SessionKind};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot(id: &str, origin: Origin, urls: &[&str]) -> StagingSnapshot {
        StagingSnapshot {
            session_id: id.to_string(),
            origin,
            kind: SessionKind::Profile,
            target: Some("alice".to_string()),
            records: urls
                .iter()
                .map(|url| RawRecord {
                    source_url: url.to_string(),
                    author: Default::default(),
                    content: String::new(),
                    posted_at: None,
                    metrics: BTreeMap::new(),
                })
                .collect(),
            written_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        let snap = snapshot("s1", Origin::InteractiveApp, &["https://x.com/a/status/1"]);

        store.write(&snap).await.unwrap();
        assert_eq!(store.read(&snap.key()).await.unwrap(), Some(snap.clone()));

        store.delete(&snap.key()).await.unwrap();
        assert_eq!(store.read(&snap.key()).await.unwrap(), None);
        // deleting twice is fine
        store.delete(&snap.key()).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_replaces_whole_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();

        store
            .write(&snapshot("s1", Origin::InteractiveApp, &["u1", "u2", "u3"]))
            .await
            .unwrap();
        store
            .write(&snapshot("s1", Origin::InteractiveApp, &["u4"]))
            .await
            .unwrap();

        let key = SessionKey::new("s1", Origin::InteractiveApp);
        let stored = store.read(&key).await.unwrap().unwrap();
        assert_eq!(stored.records.len(), 1);
        assert_eq!(stored.records[0].source_url, "u4");
    }

    #[tokio::test]
    async fn test_origins_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();

        store
            .write(&snapshot("same", Origin::InteractiveApp, &["a"]))
            .await
            .unwrap();
        store
            .write(&snapshot("same", Origin::DelegatedApi, &["b", "c"]))
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_startup_policy() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
                .await
                .unwrap();
            store
                .write(&snapshot("old", Origin::InteractiveApp, &["a"]))
                .await
                .unwrap();
        }

        let preserved = FileStagingStore::new(temp_dir.path(), StartupPolicy::Preserve)
            .await
            .unwrap();
        assert_eq!(preserved.list().await.unwrap().len(), 1);

        let purged = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        assert!(purged.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        let key = SessionKey::new("bad", Origin::InteractiveApp);
        std::fs::write(temp_dir.path().join("session_bad.json"), "[1, 2").unwrap();

        assert_eq!(store.read(&key).await.unwrap(), None);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_skips_snapshots_held_by_live_store() {
        let temp_dir = TempDir::new().unwrap();
        let running = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        let live = snapshot("live", Origin::InteractiveApp, &["a"]);
        running.write(&live).await.unwrap();
        // an in-flight write of the running store
        let tmp = temp_dir.path().join(".session_live.json.tmp");
        std::fs::write(&tmp, "{").unwrap();

        let second = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        assert_eq!(second.read(&live.key()).await.unwrap(), Some(live.clone()));
        assert!(tmp.exists());

        drop(running);
        let third = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        assert_eq!(third.read(&live.key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_releases_lease() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStagingStore::new(temp_dir.path(), StartupPolicy::Purge)
            .await
            .unwrap();
        let snap = snapshot("s1", Origin::DelegatedApi, &["a"]);
        let lease_path = crate::storage::lease_path_for(&store.snapshot_path(&snap.key()));

        store.write(&snap).await.unwrap();
        assert!(lease_path.exists());
        store.delete(&snap.key()).await.unwrap();
        assert!(!lease_path.exists());
    }
}
