pub mod config_service;
pub mod factory;
pub mod local_store;
pub mod mirrored_store;
pub mod paths;
pub mod shared;
pub mod staging_store;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::factory::{build_durable_store, build_staging_store};
pub use crate::local_store::LocalDurableStore;
pub use crate::mirrored_store::MirroredDurableStore;
pub use crate::paths::PostkeepPaths;
pub use crate::shared::{HttpSharedStore, InMemorySharedStore};
pub use crate::staging_store::{FileStagingStore, StartupPolicy};
