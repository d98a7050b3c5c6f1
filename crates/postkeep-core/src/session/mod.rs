//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: the `Session` entity, its kind/origin and the `SessionKey` address
//! - `status`: the session state machine (`SessionStatus`, transitions on `Session`)

mod model;
mod status;

pub use model::{Origin, Session, SessionKey, SessionKind};
pub use status::SessionStatus;

/// Parameters for opening a session. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub kind: SessionKind,
    pub target: Option<String>,
    pub origin: Origin,
    pub encrypted: bool,
}

impl SessionDraft {
    pub fn new(kind: SessionKind, target: Option<String>, origin: Origin) -> Self {
        Self {
            kind,
            target,
            origin,
            encrypted: false,
        }
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Materializes the draft as an open session with the given id.
    pub fn into_session(self, session_id: impl Into<String>) -> Session {
        let mut session = Session::open(
            session_id,
            self.kind,
            self.target,
            self.origin,
            chrono::Utc::now(),
        );
        session.encrypted = self.encrypted;
        session
    }
}
