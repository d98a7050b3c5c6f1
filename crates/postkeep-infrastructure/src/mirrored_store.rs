//! Local store with a best-effort mirror into the shared backend.
//!
//! The local file stays authoritative for the committed set and count. Every
//! local write is followed by an upsert into the shared store; a mirror failure
//! is logged and counted in the session's [`MirrorReport`] but never fails the
//! commit.

use crate::local_store::LocalDurableStore;
use async_trait::async_trait;
use postkeep_core::record::Record;
use postkeep_core::session::{Session, SessionDraft, SessionKey};
use postkeep_core::shared::{Profile, SharedStore};
use postkeep_core::store::{CommitOutcome, DurableStore, MirrorReport};
use postkeep_core::{PostkeepError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct MirroredDurableStore {
    local: LocalDurableStore,
    shared: Arc<dyn SharedStore>,
    reports: Mutex<HashMap<SessionKey, MirrorReport>>,
}

impl MirroredDurableStore {
    pub fn new(local: LocalDurableStore, shared: Arc<dyn SharedStore>) -> Self {
        Self {
            local,
            shared,
            reports: Mutex::new(HashMap::new()),
        }
    }

    pub fn local(&self) -> &LocalDurableStore {
        &self.local
    }

    /// Mirror health for a session since this process started.
    pub async fn mirror_report(&self, key: &SessionKey) -> MirrorReport {
        self.reports
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    async fn note_success(&self, key: &SessionKey) {
        let mut reports = self.reports.lock().await;
        reports.entry(key.clone()).or_default().mirrored += 1;
    }

    async fn note_failure(&self, key: &SessionKey, what: &str, err: &PostkeepError) {
        tracing::warn!("[MirroredStore] Mirror {} for {} failed: {}", what, key, err);
        let mut reports = self.reports.lock().await;
        let report = reports.entry(key.clone()).or_default();
        report.failed += 1;
        report.last_error = Some(err.to_string());
    }

    async fn mirror_record(&self, session: &Session, record: &Record) -> Result<()> {
        self.shared
            .upsert_record(&session.session_id, record)
            .await?;
        if !record.author.handle.is_empty() {
            let profile = Profile::from_author(&record.author, record.saved_at);
            self.shared.upsert_profile(&profile).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MirroredDurableStore {
    fn backend_name(&self) -> &'static str {
        "mirrored"
    }

    async fn create_session(&self, draft: SessionDraft) -> Result<Session> {
        let provisional = draft.clone().into_session(String::new());
        let session_id = match self.shared.create_session(&provisional).await {
            Ok(id) => id,
            Err(e) => {
                let fallback = uuid::Uuid::new_v4().to_string();
                tracing::warn!(
                    "[MirroredStore] Shared backend could not allocate a session id ({}); using local id {}",
                    e,
                    fallback
                );
                fallback
            }
        };

        let session = self
            .local
            .create_session_with_id(draft.into_session(session_id))
            .await?;

        if let Err(e) = self.shared.upsert_session(&session).await {
            self.note_failure(&session.key(), "session header", &e).await;
        }
        Ok(session)
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.local.save_session(session).await?;
        if let Err(e) = self.shared.upsert_session(session).await {
            self.note_failure(&session.key(), "session header", &e).await;
        }
        Ok(())
    }

    async fn commit_record(&self, session: &Session, record: &Record) -> Result<CommitOutcome> {
        // mirror what the local file holds, not the incoming copy
        let (outcome, stored) = self.local.commit_and_fetch(session, record).await?;
        let key = session.key();
        match self.mirror_record(session, &stored).await {
            Ok(()) => self.note_success(&key).await,
            Err(e) => self.note_failure(&key, "record", &e).await,
        }
        Ok(outcome)
    }

    async fn committed_count(&self, key: &SessionKey) -> Result<u64> {
        self.local.committed_count(key).await
    }

    async fn fetch_committed(&self, key: &SessionKey) -> Result<Vec<Record>> {
        self.local.fetch_committed(key).await
    }

    async fn load_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.local.load_session(key).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.local.list_sessions().await
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<()> {
        self.local.delete_session(key).await?;
        if let Err(e) = self.shared.delete_session(&key.session_id).await {
            self.note_failure(key, "delete", &e).await;
        }
        Ok(())
    }

    async fn reconcile(&self, session: &Session) -> Result<Option<MirrorReport>> {
        let key = session.key();
        let local_count = self.local.committed_count(&key).await?;

        match self.shared.count_records(&session.session_id).await {
            Ok(remote) => {
                let mut reports = self.reports.lock().await;
                let report = reports.entry(key.clone()).or_default();
                report.remote_count = Some(remote);
                if report.diverges_from(local_count) {
                    tracing::warn!(
                        "[MirroredStore] {} diverged: local {} records, shared {}",
                        key,
                        local_count,
                        remote
                    );
                }
            }
            Err(e) => self.note_failure(&key, "count", &e).await,
        }

        let report = self.mirror_report(&key).await;
        tracing::debug!(
            "[MirroredStore] Reconciled {} (mirrored {}, failed {})",
            key,
            report.mirrored,
            report.failed
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::InMemorySharedStore;
    use crate::storage::LockOptions;
    use chrono::Utc;
    use postkeep_core::record::Author;
    use postkeep_core::session::{Origin, SessionKind};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(id: &str, likes: u64) -> Record {
        Record {
            record_id: id.to_string(),
            author: Author {
                handle: "alice".to_string(),
                display_name: "Alice".to_string(),
            },
            content: format!("post {}", id),
            posted_at: None,
            metrics: BTreeMap::from([("likes".to_string(), likes)]),
            source_url: format!("https://x.com/alice/status/{}", id),
            saved_at: Utc::now(),
        }
    }

    async fn setup(temp_dir: &TempDir) -> (MirroredDurableStore, Arc<InMemorySharedStore>) {
        let local = LocalDurableStore::new(temp_dir.path(), LockOptions::default())
            .await
            .unwrap();
        let shared = Arc::new(InMemorySharedStore::new());
        let store = MirroredDurableStore::new(local, shared.clone());
        (store, shared)
    }

    fn draft() -> SessionDraft {
        SessionDraft::new(
            SessionKind::Profile,
            Some("alice".to_string()),
            Origin::InteractiveApp,
        )
    }

    #[tokio::test]
    async fn test_session_id_comes_from_shared_backend() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;

        let session = store.create_session(draft()).await.unwrap();
        assert!(session.session_id.starts_with("shared-"));
        assert!(shared.session(&session.session_id).await.is_some());
        assert!(store.local().session_path(&session.key()).exists());
    }

    #[tokio::test]
    async fn test_falls_back_to_local_id_when_offline() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;
        shared.set_offline(true);

        let session = store.create_session(draft()).await.unwrap();
        assert!(!session.session_id.starts_with("shared-"));
        assert!(store.load_session(&session.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_mirrors_record_and_profile() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;
        let session = store.create_session(draft()).await.unwrap();

        store.commit_record(&session, &record("1", 3)).await.unwrap();
        store.commit_record(&session, &record("1", 8)).await.unwrap();

        assert_eq!(shared.count_records(&session.session_id).await.unwrap(), 1);
        assert_eq!(shared.profile("alice").await.unwrap().display_name, "Alice");

        let report = store.reconcile(&session).await.unwrap().unwrap();
        assert_eq!(report.remote_count, Some(1));
        assert!(!report.diverges_from(1));
    }

    #[tokio::test]
    async fn test_refresh_mirrors_stored_record() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;
        let session = store.create_session(draft()).await.unwrap();

        store.commit_record(&session, &record("1", 3)).await.unwrap();
        let mut edited = record("1", 9);
        edited.content = "edited after commit".to_string();
        let outcome = store.commit_record(&session, &edited).await.unwrap();
        assert_eq!(outcome.kind, postkeep_core::store::CommitKind::Refreshed);

        let local = store.fetch_committed(&session.key()).await.unwrap();
        let remote = shared.fetch_records(&session.session_id).await.unwrap();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].content, "post 1");
        assert_eq!(remote[0].metrics["likes"], 9);
        assert_eq!(remote[0], local[0]);
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_fail_commit() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;
        let session = store.create_session(draft()).await.unwrap();

        store.commit_record(&session, &record("1", 1)).await.unwrap();
        shared.set_offline(true);
        let outcome = store.commit_record(&session, &record("2", 1)).await.unwrap();
        assert_eq!(outcome.committed_count, 2);
        assert_eq!(store.committed_count(&session.key()).await.unwrap(), 2);

        shared.set_offline(false);
        let report = store.reconcile(&session).await.unwrap().unwrap();
        assert_eq!(report.mirrored, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remote_count, Some(1));
        assert!(report.diverges_from(2));
        assert!(report.last_error.is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_both_copies() {
        let temp_dir = TempDir::new().unwrap();
        let (store, shared) = setup(&temp_dir).await;
        let session = store.create_session(draft()).await.unwrap();
        store.commit_record(&session, &record("1", 1)).await.unwrap();

        store.delete_session(&session.key()).await.unwrap();
        assert!(store.load_session(&session.key()).await.unwrap().is_none());
        assert!(shared.session(&session.session_id).await.is_none());
    }
}
