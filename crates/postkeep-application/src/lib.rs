//! Application layer for postkeep.
//!
//! Coordinates the domain and infrastructure layers: the session lifecycle and
//! the record pipeline that external callers drive.

pub mod lifecycle;
pub mod orchestrator;

#[cfg(test)]
mod test_support;

pub use lifecycle::{ClosedSession, SessionLifecycleManager};
pub use orchestrator::{
    DeliveryPayload, PipelineOrchestrator, SessionRequest, SessionResult, Verification,
};
