//! Durable store interface.
//!
//! Defines the contract every persistence backend implements. The active
//! implementation is chosen once at startup; callers never branch on it.

use crate::error::Result;
use crate::record::Record;
use crate::session::{Session, SessionDraft, SessionKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a commit did to the session's record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    /// The record id was new to the session.
    Inserted,
    /// The record id was already present; its metrics were refreshed.
    Refreshed,
}

/// Result of a single record commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub kind: CommitKind,
    /// Records in the session after this commit.
    pub committed_count: u64,
}

/// Health of the best-effort mirror into the shared backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    /// Records successfully mirrored for this session.
    pub mirrored: u64,
    /// Mirror attempts that failed.
    pub failed: u64,
    /// Record count reported by the shared backend at the last reconcile.
    pub remote_count: Option<u64>,
    pub last_error: Option<String>,
}

impl MirrorReport {
    /// True when the shared backend holds fewer records than the local file.
    pub fn diverges_from(&self, local_count: u64) -> bool {
        matches!(self.remote_count, Some(remote) if remote < local_count)
    }
}

/// An abstract durable store for sessions and their records.
///
/// # Implementation Notes
///
/// Implementations must guarantee:
/// - at most one writer per session file at a time
/// - a `record_id` appears at most once per session
/// - committing the same record again only refreshes its metrics
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Short backend label for logs ("local", "mirrored").
    fn backend_name(&self) -> &'static str;

    /// Allocates a session id, persists the opening header and returns the session.
    async fn create_session(&self, draft: SessionDraft) -> Result<Session>;

    /// Persists a session header, keeping its records.
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Commits one record into a session (idempotent per `record_id`).
    async fn commit_record(&self, session: &Session, record: &Record) -> Result<CommitOutcome>;

    /// Canonical committed count for a session.
    async fn committed_count(&self, key: &SessionKey) -> Result<u64>;

    /// Returns exactly the committed record set, in commit order.
    async fn fetch_committed(&self, key: &SessionKey) -> Result<Vec<Record>>;

    /// Loads a session header.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    async fn load_session(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Lists all stored sessions, most recently opened first.
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    /// Deletes a whole session (header and records).
    async fn delete_session(&self, key: &SessionKey) -> Result<()>;

    /// Hook run after each commit batch. Backends with a mirror compare counts here.
    async fn reconcile(&self, _session: &Session) -> Result<Option<MirrorReport>> {
        Ok(None)
    }
}
