//! Shared document store adapters.
//!
//! # Module Structure
//!
//! - `http`: REST client for a networked document store
//! - `memory`: in-process store used for tests and offline development

mod http;
mod memory;

pub use http::HttpSharedStore;
pub use memory::InMemorySharedStore;
