//! Domain layer of postkeep: records, sessions and the storage contracts the
//! persistence pipeline is built on.

pub mod config;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod producer;
pub mod record;
pub mod session;
pub mod shared;
pub mod staging;
pub mod store;

// Re-export common error type
pub use error::{ErrorClass, PostkeepError, Result};
