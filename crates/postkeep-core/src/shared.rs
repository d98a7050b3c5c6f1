//! Shared (networked) document store interface.
//!
//! The shared backend holds three document kinds: sessions, records keyed by
//! `record_id`, and author profiles keyed by handle. Every write is an upsert,
//! so retries and duplicate deliveries are harmless.

use crate::error::Result;
use crate::record::{Author, Record};
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub handle: String,
    pub display_name: String,
    pub last_seen_at: DateTime<Utc>,
}

impl Profile {
    pub fn from_author(author: &Author, seen_at: DateTime<Utc>) -> Self {
        Self {
            handle: author.handle.clone(),
            display_name: author.display_name.clone(),
            last_seen_at: seen_at,
        }
    }
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Creates a session document and returns the backend-generated id.
    async fn create_session(&self, session: &Session) -> Result<String>;

    /// Upserts a session document by id.
    async fn upsert_session(&self, session: &Session) -> Result<()>;

    /// Upserts a record by `record_id` (set-on-conflict: mutable fields are updated).
    async fn upsert_record(&self, session_id: &str, record: &Record) -> Result<()>;

    /// Upserts a profile by handle.
    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;

    /// Counts the records attached to a session.
    async fn count_records(&self, session_id: &str) -> Result<u64>;

    /// Returns a session's records. Order is not guaranteed.
    async fn fetch_records(&self, session_id: &str) -> Result<Vec<Record>>;

    /// Deletes a session document and its records.
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}
