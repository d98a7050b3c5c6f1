//! Store doubles for unit tests.

use async_trait::async_trait;
use postkeep_core::record::Record;
use postkeep_core::session::{Session, SessionDraft, SessionKey};
use postkeep_core::store::{CommitOutcome, DurableStore};
use postkeep_core::{PostkeepError, Result};
use postkeep_infrastructure::LocalDurableStore;
use postkeep_infrastructure::storage::LockOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Local store whose first `failures` saves of a closed header report a busy lock.
pub struct FlakyCloseStore {
    inner: LocalDurableStore,
    failures_left: AtomicU32,
}

impl FlakyCloseStore {
    pub async fn new(sessions_dir: impl AsRef<Path>, failures: u32) -> Self {
        Self {
            inner: LocalDurableStore::new(sessions_dir, LockOptions::default())
                .await
                .unwrap(),
            failures_left: AtomicU32::new(failures),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DurableStore for FlakyCloseStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn create_session(&self, draft: SessionDraft) -> Result<Session> {
        self.inner.create_session(draft).await
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        if session.is_closed() && self.take_failure() {
            return Err(PostkeepError::LockBusy {
                path: format!("{}.lock", session.key().file_stem()),
                waited_ms: 1,
            });
        }
        self.inner.save_session(session).await
    }

    async fn commit_record(&self, session: &Session, record: &Record) -> Result<CommitOutcome> {
        self.inner.commit_record(session, record).await
    }

    async fn committed_count(&self, key: &SessionKey) -> Result<u64> {
        self.inner.committed_count(key).await
    }

    async fn fetch_committed(&self, key: &SessionKey) -> Result<Vec<Record>> {
        self.inner.fetch_committed(key).await
    }

    async fn load_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.inner.load_session(key).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.inner.list_sessions().await
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<()> {
        self.inner.delete_session(key).await
    }
}
