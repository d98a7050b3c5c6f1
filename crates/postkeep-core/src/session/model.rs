//! Session domain model.
//!
//! A session is one logical scrape attempt. It is addressed by a
//! [`SessionKey`] because interactive and delegated-API sessions live in
//! separate namespaces.

use super::status::SessionStatus;
use crate::error::PostkeepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a session scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Profile,
    Search,
    Timeline,
    Diagnostic,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Profile => "profile",
            SessionKind::Search => "search",
            SessionKind::Timeline => "timeline",
            SessionKind::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = PostkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "profile" => Ok(SessionKind::Profile),
            "search" => Ok(SessionKind::Search),
            "timeline" => Ok(SessionKind::Timeline),
            "diagnostic" => Ok(SessionKind::Diagnostic),
            other => Err(PostkeepError::config(format!("unknown session kind '{}'", other))),
        }
    }
}

/// Who started the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Started from the interactive app.
    InteractiveApp,
    /// Started by an external client through the delegated API.
    DelegatedApi,
}

impl Origin {
    /// Local file name prefix; the two origins never share a namespace.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Origin::InteractiveApp => "session",
            Origin::DelegatedApi => "sessionapi",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::InteractiveApp => "interactive-app",
            Origin::DelegatedApi => "delegated-api",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = PostkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interactive-app" | "interactive" | "app" => Ok(Origin::InteractiveApp),
            "delegated-api" | "api" => Ok(Origin::DelegatedApi),
            other => Err(PostkeepError::config(format!("unknown origin '{}'", other))),
        }
    }
}

/// Addresses one session across stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: String,
    pub origin: Origin,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, origin: Origin) -> Self {
        Self {
            session_id: session_id.into(),
            origin,
        }
    }

    /// Deterministic file stem, e.g. `session_<id>` or `sessionapi_<id>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.origin.file_prefix(), self.session_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

/// One logical scrape attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub kind: SessionKind,
    /// Username, query string, or nothing
    pub target: Option<String>,
    pub origin: Origin,
    /// Whether results were returned through the encryption envelope
    #[serde(default)]
    pub encrypted: bool,
    pub status: SessionStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub committed_count: u64,
    /// Reason recorded when the session failed
    #[serde(default)]
    pub failure: Option<String>,
}

impl Session {
    /// Creates a session in the `open` state.
    pub fn open(
        session_id: impl Into<String>,
        kind: SessionKind,
        target: Option<String>,
        origin: Origin,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            target,
            origin,
            encrypted: false,
            status: SessionStatus::Open,
            opened_at,
            closed_at: None,
            committed_count: 0,
            failure: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.session_id.clone(), self.origin)
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}
