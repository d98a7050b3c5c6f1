//! Write-ahead staging of raw producer output.

use crate::error::Result;
use crate::record::RawRecord;
use crate::session::{Origin, SessionKey, SessionKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full snapshot of everything a session's producer has yielded so far.
///
/// Always written whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingSnapshot {
    pub session_id: String,
    pub origin: Origin,
    pub kind: SessionKind,
    pub target: Option<String>,
    pub records: Vec<RawRecord>,
    pub written_at: DateTime<Utc>,
}

impl StagingSnapshot {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.session_id.clone(), self.origin)
    }
}

/// Storage for staging snapshots, at most one per session.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Replaces the snapshot for `snapshot.key()`. Readers never see a partial write.
    async fn write(&self, snapshot: &StagingSnapshot) -> Result<()>;

    /// Reads a session's snapshot.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))`: snapshot present
    /// - `Ok(None)`: no snapshot (or an unreadable one, which is logged)
    async fn read(&self, key: &SessionKey) -> Result<Option<StagingSnapshot>>;

    /// Deletes a session's snapshot. Deleting an absent snapshot is not an error.
    async fn delete(&self, key: &SessionKey) -> Result<()>;

    /// Lists every retained snapshot.
    async fn list(&self) -> Result<Vec<StagingSnapshot>>;
}
