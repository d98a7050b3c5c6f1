//! Local-file durable store.
//!
//! One JSON file per session holding the session header and its record array:
//!
//! ```text
//! sessions/
//! ├── session_<id>.json        # interactive-app sessions
//! ├── sessionapi_<id>.json     # delegated-api sessions
//! └── session_<id>.lock        # advisory lock, one per session file
//! ```
//!
//! Every commit is a read-modify-write under the session file's exclusive lock,
//! finished by an atomic rename. This file is authoritative for a session's
//! committed set and count.

use crate::storage::{AtomicJsonFile, LockOptions, lock_path_for, run_blocking};
use async_trait::async_trait;
use postkeep_core::record::Record;
use postkeep_core::session::{Session, SessionDraft, SessionKey};
use postkeep_core::store::{CommitKind, CommitOutcome, DurableStore};
use postkeep_core::{PostkeepError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// On-disk layout of a session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub session: Session,
    /// Commit order, append-only
    #[serde(default)]
    pub records: Vec<Record>,
}

impl SessionFile {
    fn new(session: Session) -> Self {
        Self {
            session,
            records: Vec::new(),
        }
    }

    fn record_count(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Durable store backed by local JSON files.
#[derive(Debug, Clone)]
pub struct LocalDurableStore {
    sessions_dir: PathBuf,
    lock: LockOptions,
}

impl LocalDurableStore {
    /// Creates the store, ensuring `sessions_dir` exists.
    pub async fn new(sessions_dir: impl AsRef<Path>, lock: LockOptions) -> Result<Self> {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();
        fs::create_dir_all(&sessions_dir).await?;
        Ok(Self { sessions_dir, lock })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Path of a session's file, e.g. `sessions/sessionapi_<id>.json`.
    pub fn session_path(&self, key: &SessionKey) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", key.file_stem()))
    }

    fn file(&self, key: &SessionKey) -> AtomicJsonFile<SessionFile> {
        AtomicJsonFile::new(self.session_path(key)).with_lock_options(self.lock)
    }

    /// Persists a session whose id was allocated elsewhere (e.g. by a shared backend).
    pub async fn create_session_with_id(&self, session: Session) -> Result<Session> {
        let file = self.file(&session.key());
        let header = session.clone();
        run_blocking(move || {
            file.update(
                || SessionFile::new(header.clone()),
                |existing: &mut SessionFile| {
                    if !existing.records.is_empty() || existing.session != header {
                        return Err(PostkeepError::internal(format!(
                            "session {} already exists",
                            header.session_id
                        )));
                    }
                    Ok(())
                },
            )
        })
        .await?;

        tracing::info!(
            "[LocalStore] Opened session {} ({} {})",
            session.key(),
            session.kind,
            session.target.as_deref().unwrap_or("-")
        );
        Ok(session)
    }

    /// Commits a record and returns it as stored.
    ///
    /// On a refresh the stored record keeps its first content, author and URL,
    /// so the returned record can differ from `record`.
    pub async fn commit_and_fetch(
        &self,
        session: &Session,
        record: &Record,
    ) -> Result<(CommitOutcome, Record)> {
        let file = self.file(&session.key());
        let header = session.clone();
        let record = record.clone();

        let (outcome, stored) = run_blocking(move || {
            file.update(
                || SessionFile::new(header.clone()),
                |existing: &mut SessionFile| {
                    if existing.session.is_closed() {
                        return Err(PostkeepError::InvalidTransition {
                            session_id: existing.session.session_id.clone(),
                            from: existing.session.status.to_string(),
                            to: "commit".to_string(),
                        });
                    }

                    let (kind, stored) = match existing
                        .records
                        .iter_mut()
                        .find(|r| r.record_id == record.record_id)
                    {
                        Some(stored) => {
                            stored.refresh_from(&record);
                            (CommitKind::Refreshed, stored.clone())
                        }
                        None => {
                            existing.records.push(record.clone());
                            (CommitKind::Inserted, record)
                        }
                    };

                    existing.session.committed_count = existing.record_count();
                    let outcome = CommitOutcome {
                        kind,
                        committed_count: existing.record_count(),
                    };
                    Ok((outcome, stored))
                },
            )
        })
        .await?;

        tracing::debug!(
            "[LocalStore] {:?} record into {} (count {})",
            outcome.kind,
            session.key(),
            outcome.committed_count
        );
        Ok((outcome, stored))
    }

    /// Reads a session file without taking the lock.
    ///
    /// Writes go through rename, so the file is always whole. A file that does not
    /// parse is reported and treated as holding no records.
    async fn read_file(&self, key: &SessionKey) -> Result<Option<SessionFile>> {
        let file = self.file(key);
        let session_key = key.clone();
        run_blocking(move || match file.load() {
            Ok(loaded) => Ok(loaded),
            Err(crate::storage::AtomicJsonError::JsonError(e)) => {
                tracing::warn!(
                    "[LocalStore] Session file for {} is corrupt, treating as empty: {}",
                    session_key,
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        })
        .await
    }
}

#[async_trait]
impl DurableStore for LocalDurableStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn create_session(&self, draft: SessionDraft) -> Result<Session> {
        let session = draft.into_session(uuid::Uuid::new_v4().to_string());
        self.create_session_with_id(session).await
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let file = self.file(&session.key());
        let header = session.clone();
        run_blocking(move || {
            file.update(
                || SessionFile::new(header.clone()),
                |existing: &mut SessionFile| {
                    existing.session = header.clone();
                    // the record array is the source of truth for the count
                    existing.session.committed_count = existing.record_count();
                    Ok::<_, PostkeepError>(())
                },
            )
        })
        .await
    }

    async fn commit_record(&self, session: &Session, record: &Record) -> Result<CommitOutcome> {
        let (outcome, _) = self.commit_and_fetch(session, record).await?;
        Ok(outcome)
    }

    async fn committed_count(&self, key: &SessionKey) -> Result<u64> {
        match self.read_file(key).await? {
            Some(file) => Ok(file.record_count()),
            None if fs::try_exists(self.session_path(key)).await? => Ok(0),
            None => Err(PostkeepError::not_found("session", key.to_string())),
        }
    }

    async fn fetch_committed(&self, key: &SessionKey) -> Result<Vec<Record>> {
        match self.read_file(key).await? {
            Some(file) => Ok(file.records),
            None if fs::try_exists(self.session_path(key)).await? => Ok(Vec::new()),
            None => Err(PostkeepError::not_found("session", key.to_string())),
        }
    }

    async fn load_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        Ok(self.read_file(key).await?.map(|file| file.session))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut entries = fs::read_dir(&self.sessions_dir).await?;
        let mut sessions = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let is_hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            if is_hidden {
                continue;
            }

            let file = AtomicJsonFile::<SessionFile>::new(path.clone());
            match run_blocking(move || file.load().map_err(PostkeepError::from)).await {
                Ok(Some(loaded)) => sessions.push(loaded.session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[LocalStore] Skipping unreadable {}: {}", path.display(), e);
                }
            }
        }

        sessions.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        Ok(sessions)
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<()> {
        let file = self.file(key);
        run_blocking(move || file.remove().map_err(PostkeepError::from)).await?;

        // Whole-session deletion assumes no writer is active on this session.
        match fs::remove_file(lock_path_for(&self.session_path(key))).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("[LocalStore] Deleted session {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use postkeep_core::metrics::RawMetric;
    use postkeep_core::record::{Author, RawRecord};
    use postkeep_core::session::{Origin, SessionKind, SessionStatus};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(id: &str, views: &str) -> Record {
        let mut metrics = BTreeMap::new();
        metrics.insert("views".to_string(), RawMetric::from(views));
        let raw = RawRecord {
            source_url: format!("https://x.com/alice/status/{}", id),
            author: Author {
                handle: "alice".to_string(),
                display_name: "Alice".to_string(),
            },
            content: format!("post {}", id),
            posted_at: None,
            metrics,
        };
        Record::from_raw(&raw, Utc::now()).unwrap()
    }

    async fn store(dir: &TempDir) -> LocalDurableStore {
        LocalDurableStore::new(dir.path().join("sessions"), LockOptions::default())
            .await
            .unwrap()
    }

    fn draft(origin: Origin) -> SessionDraft {
        SessionDraft::new(SessionKind::Search, Some("rust".to_string()), origin)
    }

    #[tokio::test]
    async fn test_create_session_file_naming() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let app = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();
        let api = store.create_session(draft(Origin::DelegatedApi)).await.unwrap();

        let app_file = format!("session_{}.json", app.session_id);
        let api_file = format!("sessionapi_{}.json", api.session_id);
        assert!(store.sessions_dir().join(app_file).exists());
        assert!(store.sessions_dir().join(api_file).exists());
        assert_eq!(app.status, SessionStatus::Open);
    }

    #[tokio::test]
    async fn test_idempotent_commit() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();

        let first = store.commit_record(&session, &record("1", "10")).await.unwrap();
        assert_eq!(first.kind, CommitKind::Inserted);
        assert_eq!(first.committed_count, 1);

        let second = store.commit_record(&session, &record("1", "2K")).await.unwrap();
        assert_eq!(second.kind, CommitKind::Refreshed);
        assert_eq!(second.committed_count, 1);

        let stored = store.fetch_committed(&session.key()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].metrics["views"], 2000);
    }

    #[tokio::test]
    async fn test_commit_order_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();

        for id in ["30", "10", "20", "10"] {
            store.commit_record(&session, &record(id, "1")).await.unwrap();
        }

        let ids: Vec<String> = store
            .fetch_committed(&session.key())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.record_id)
            .collect();
        assert_eq!(ids, vec!["30", "10", "20"]);
    }

    #[tokio::test]
    async fn test_commit_rejected_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let mut session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();
        session.close(Utc::now()).unwrap();
        store.save_session(&session).await.unwrap();

        let err = store.commit_record(&session, &record("1", "1")).await.unwrap_err();
        assert!(matches!(err, PostkeepError::InvalidTransition { .. }));
        assert_eq!(store.committed_count(&session.key()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_session_keeps_records_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let mut session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();
        store.commit_record(&session, &record("1", "1")).await.unwrap();

        // stale in-memory count must not overwrite the file's count
        session.committed_count = 0;
        store.save_session(&session).await.unwrap();

        let loaded = store.load_session(&session.key()).await.unwrap().unwrap();
        assert_eq!(loaded.committed_count, 1);
        assert_eq!(store.fetch_committed(&session.key()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_record_ids() {
        let temp_dir = TempDir::new().unwrap();
        let session_key;
        let before: Vec<String>;
        {
            let store = store(&temp_dir).await;
            let session = store.create_session(draft(Origin::DelegatedApi)).await.unwrap();
            for id in ["5", "6", "7"] {
                store.commit_record(&session, &record(id, "1")).await.unwrap();
            }
            session_key = session.key();
            before = store
                .fetch_committed(&session_key)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.record_id)
                .collect();
        }

        let reopened = store(&temp_dir).await;
        let after: Vec<String> = reopened
            .fetch_committed(&session_key)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.record_id)
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty_and_recovers_on_commit() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();
        std::fs::write(store.session_path(&session.key()), "{ truncated").unwrap();

        assert_eq!(store.committed_count(&session.key()).await.unwrap(), 0);
        assert!(store.fetch_committed(&session.key()).await.unwrap().is_empty());

        let outcome = store.commit_record(&session, &record("9", "1")).await.unwrap();
        assert_eq!(outcome.committed_count, 1);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let key = SessionKey::new("nope", Origin::InteractiveApp);

        assert!(store.load_session(&key).await.unwrap().is_none());
        assert!(store.fetch_committed(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let a = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();
        let b = store.create_session(draft(Origin::DelegatedApi)).await.unwrap();
        store.commit_record(&a, &record("1", "1")).await.unwrap();

        assert_eq!(store.list_sessions().await.unwrap().len(), 2);

        store.delete_session(&a.key()).await.unwrap();
        let remaining = store.list_sessions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, b.session_id);
        assert!(!lock_path_for(&store.session_path(&a.key())).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_commits_do_not_lose_updates() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let session = store.create_session(draft(Origin::InteractiveApp)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                store
                    .commit_record(&session, &record(&i.to_string(), "1"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.committed_count(&session.key()).await.unwrap(), 8);
    }
}
