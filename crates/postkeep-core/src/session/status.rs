//! Session state machine.
//!
//! ```text
//!            fail()                 close()
//!   open ───────────▶ failed ─────────────▶ failed (closed_at set)
//!     │
//!     │ close(), committed_count > 0 ──▶ completed
//!     └ close(), committed_count == 0 ─▶ incomplete
//! ```
//!
//! A terminal status is assigned exactly once. `failed` is sticky: count-based
//! derivation never overrides it.

use super::model::Session;
use crate::error::{PostkeepError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting commits.
    Open,
    /// Closed with at least one committed record.
    Completed,
    /// Closed cleanly with nothing persisted.
    Incomplete,
    /// An unrecoverable error occurred before close.
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Open)
    }

    /// Status a session ends in, given its final count and whether it failed.
    pub fn derive(committed_count: u64, failed: bool) -> Self {
        if failed {
            SessionStatus::Failed
        } else if committed_count > 0 {
            SessionStatus::Completed
        } else {
            SessionStatus::Incomplete
        }
    }

    /// Whether the staging snapshot must be kept after close.
    pub fn retains_staging(&self) -> bool {
        !matches!(self, SessionStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Completed => "completed",
            SessionStatus::Incomplete => "incomplete",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Session {
    fn transition_error(&self, to: SessionStatus) -> PostkeepError {
        PostkeepError::InvalidTransition {
            session_id: self.session_id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Updates the committed count while the session is still unclosed.
    pub fn set_committed_count(&mut self, count: u64) -> Result<()> {
        if self.is_closed() {
            return Err(self.transition_error(self.status));
        }
        self.committed_count = count;
        Ok(())
    }

    /// Marks the session failed. The first recorded reason wins.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        match self.status {
            SessionStatus::Open => {
                self.status = SessionStatus::Failed;
                self.failure = Some(reason.into());
                Ok(())
            }
            SessionStatus::Failed => Ok(()),
            SessionStatus::Completed | SessionStatus::Incomplete => {
                Err(self.transition_error(SessionStatus::Failed))
            }
        }
    }

    /// Closes the session and returns its terminal status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the session was already closed.
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<SessionStatus> {
        if self.is_closed() {
            return Err(self.transition_error(self.status));
        }

        let failed = self.status == SessionStatus::Failed;
        self.status = SessionStatus::derive(self.committed_count, failed);
        self.closed_at = Some(now);
        Ok(self.status)
    }
}
