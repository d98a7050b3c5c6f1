use async_trait::async_trait;
use postkeep_core::record::Record;
use postkeep_core::session::Session;
use postkeep_core::shared::{Profile, SharedStore};
use postkeep_core::{PostkeepError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Documents {
    sessions: HashMap<String, Session>,
    /// session id -> record id -> record
    records: HashMap<String, HashMap<String, Record>>,
    profiles: HashMap<String, Profile>,
}

/// Shared store kept in process memory.
///
/// Upserts behave like the networked backend. `set_offline(true)` makes every
/// call fail with `Unavailable`, which is how mirror failures are exercised.
#[derive(Default)]
pub struct InMemorySharedStore {
    docs: RwLock<Documents>,
    offline: AtomicBool,
    next_id: AtomicU64,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(PostkeepError::unavailable("shared store is offline"))
        } else {
            Ok(())
        }
    }

    pub async fn profile(&self, handle: &str) -> Option<Profile> {
        self.docs.read().await.profiles.get(handle).cloned()
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.docs.read().await.sessions.get(session_id).cloned()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    async fn create_session(&self, session: &Session) -> Result<String> {
        self.check_online()?;
        let id = format!("shared-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut stored = session.clone();
        stored.session_id = id.clone();

        let mut docs = self.docs.write().await;
        docs.sessions.insert(id.clone(), stored);
        docs.records.entry(id.clone()).or_default();
        Ok(id)
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.check_online()?;
        self.docs
            .write()
            .await
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn upsert_record(&self, session_id: &str, record: &Record) -> Result<()> {
        self.check_online()?;
        let mut docs = self.docs.write().await;
        let records = docs.records.entry(session_id.to_string()).or_default();
        match records.get_mut(&record.record_id) {
            Some(stored) => stored.refresh_from(record),
            None => {
                records.insert(record.record_id.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.check_online()?;
        self.docs
            .write()
            .await
            .profiles
            .insert(profile.handle.clone(), profile.clone());
        Ok(())
    }

    async fn count_records(&self, session_id: &str) -> Result<u64> {
        self.check_online()?;
        let docs = self.docs.read().await;
        Ok(docs
            .records
            .get(session_id)
            .map(|records| records.len() as u64)
            .unwrap_or(0))
    }

    async fn fetch_records(&self, session_id: &str) -> Result<Vec<Record>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        Ok(docs
            .records
            .get(session_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.check_online()?;
        let mut docs = self.docs.write().await;
        docs.sessions.remove(session_id);
        docs.records.remove(session_id);
        Ok(())
    }
}
