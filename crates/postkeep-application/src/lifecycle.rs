//! Session Lifecycle Manager.
//!
//! Owns the in-flight sessions of this process and drives them through the
//! state machine in `postkeep_core::session`. Every transition is persisted
//! through the durable store before it becomes visible to callers.

use chrono::Utc;
use postkeep_core::session::{Session, SessionDraft, SessionKey, SessionStatus};
use postkeep_core::staging::StagingStore;
use postkeep_core::store::{CommitOutcome, DurableStore, MirrorReport};
use postkeep_core::{PostkeepError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of closing a session.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub session: Session,
    /// Whether the staging snapshot is still on disk after close.
    pub staging_retained: bool,
    pub mirror: Option<MirrorReport>,
}

pub struct SessionLifecycleManager {
    /// Sessions opened by this process and not yet closed
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    store: Arc<dyn DurableStore>,
    staging: Arc<dyn StagingStore>,
}

impl SessionLifecycleManager {
    pub fn new(store: Arc<dyn DurableStore>, staging: Arc<dyn StagingStore>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
            staging,
        }
    }

    /// Opens a session: the store assigns the id and persists the header.
    pub async fn open(&self, draft: SessionDraft) -> Result<Session> {
        let session = self.store.create_session(draft).await?;
        tracing::info!(
            "[Lifecycle] Opened {} session {} via {} store",
            session.kind,
            session.key(),
            self.store.backend_name()
        );

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.key(), session.clone());
        Ok(session)
    }

    /// Returns an open session from the cache.
    pub async fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Sessions opened by this process that have not been closed.
    pub async fn active_sessions(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<Session> = sessions.values().cloned().collect();
        active.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        active
    }

    /// Applies the count reported by a successful commit.
    pub async fn record_commit(&self, key: &SessionKey, outcome: &CommitOutcome) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| PostkeepError::not_found("open session", key.to_string()))?;
        session.set_committed_count(outcome.committed_count)
    }

    /// Re-reads the canonical count from the store and reconciles any mirror.
    ///
    /// Called after each commit batch rather than trusting incremental counts.
    pub async fn refresh_count(&self, key: &SessionKey) -> Result<(u64, Option<MirrorReport>)> {
        let count = self.store.committed_count(key).await?;

        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(key)
                .ok_or_else(|| PostkeepError::not_found("open session", key.to_string()))?;
            session.set_committed_count(count)?;
            session.clone()
        };

        let mirror = self.store.reconcile(&session).await?;
        Ok((count, mirror))
    }

    /// Marks a session failed and persists the header. Committed records stand.
    pub async fn fail(&self, key: &SessionKey, reason: &str) -> Result<Session> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(key)
                .ok_or_else(|| PostkeepError::not_found("open session", key.to_string()))?;
            session.fail(reason)?;
            session.clone()
        };

        tracing::error!("[Lifecycle] Session {} failed: {}", key, reason);
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Closes a session, assigning its terminal status, and decides staging cleanup.
    ///
    /// The snapshot is deleted only when the session completed. If deleting it
    /// fails, it is reported as retained. If the terminal header cannot be
    /// saved, the session stays open in the cache and `close` may be retried.
    pub async fn close(&self, key: &SessionKey) -> Result<ClosedSession> {
        let mirror = match self.refresh_count(key).await {
            Ok((_, mirror)) => mirror,
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "[Lifecycle] Could not refresh count for {} before close, using last known: {}",
                    key,
                    e
                );
                None
            }
        };

        // Close a copy: the cached entry stays open until the terminal header
        // is on disk, so a failed save can be retried.
        let session = {
            let sessions = self.sessions.read().await;
            let mut session = sessions
                .get(key)
                .cloned()
                .ok_or_else(|| PostkeepError::not_found("open session", key.to_string()))?;
            session.close(Utc::now())?;
            session
        };

        self.store.save_session(&session).await?;
        self.sessions.write().await.remove(key);

        let staging_retained = if session.status.retains_staging() {
            match self.staging.read(key).await {
                Ok(snapshot) => snapshot.is_some(),
                Err(e) => {
                    tracing::warn!(
                        "[Lifecycle] Could not check staging snapshot for {}: {}",
                        key,
                        e
                    );
                    true
                }
            }
        } else {
            match self.staging.delete(key).await {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(
                        "[Lifecycle] Could not delete staging snapshot for {}: {}",
                        key,
                        e
                    );
                    true
                }
            }
        };

        let retained_note = if staging_retained { "; staging retained" } else { "" };
        if session.status == SessionStatus::Failed {
            tracing::warn!(
                "[Lifecycle] Closed {} as {} with {} record(s){}",
                key,
                session.status,
                session.committed_count,
                retained_note
            );
        } else {
            tracing::info!(
                "[Lifecycle] Closed {} as {} with {} record(s){}",
                key,
                session.status,
                session.committed_count,
                retained_note
            );
        }

        Ok(ClosedSession {
            session,
            staging_retained,
            mirror,
        })
    }
}
