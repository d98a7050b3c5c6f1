//! Storage layer for atomic file operations.

mod atomic_json;

pub use atomic_json::{
    AtomicJsonError, AtomicJsonFile, FileLease, LockOptions, lease_path_for, lock_path_for,
};

use postkeep_core::PostkeepError;

impl From<AtomicJsonError> for PostkeepError {
    fn from(err: AtomicJsonError) -> Self {
        match err {
            AtomicJsonError::IoError(e) => e.into(),
            AtomicJsonError::JsonError(e) => e.into(),
            AtomicJsonError::LockTimeout { path, waited } => PostkeepError::LockBusy {
                path: path.display().to_string(),
                waited_ms: waited.as_millis() as u64,
            },
            AtomicJsonError::LockError(message) => PostkeepError::io(message),
        }
    }
}

/// Runs blocking file work off the async runtime.
pub(crate) async fn run_blocking<R, F>(f: F) -> postkeep_core::Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> postkeep_core::Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PostkeepError::internal(format!("blocking task failed: {}", e)))?
}
