//! Atomic JSON file operations with ACID guarantees.
//!
//! Provides a thin layer for safe concurrent access to the JSON files backing
//! session and staging storage.

use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Errors that can occur during atomic JSON operations.
#[derive(Debug)]
pub enum AtomicJsonError {
    /// File I/O error.
    IoError(std::io::Error),
    /// JSON serialization/deserialization error.
    JsonError(serde_json::Error),
    /// The lock is held by another writer and the wait timed out.
    LockTimeout { path: PathBuf, waited: Duration },
    /// File locking error other than contention.
    LockError(String),
}

impl std::fmt::Display for AtomicJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicJsonError::IoError(e) => write!(f, "I/O error: {}", e),
            AtomicJsonError::JsonError(e) => write!(f, "JSON error: {}", e),
            AtomicJsonError::LockTimeout { path, waited } => {
                write!(f, "Lock on {} still held after {:?}", path.display(), waited)
            }
            AtomicJsonError::LockError(e) => write!(f, "Lock error: {}", e),
        }
    }
}

impl std::error::Error for AtomicJsonError {}

impl From<std::io::Error> for AtomicJsonError {
    fn from(e: std::io::Error) -> Self {
        AtomicJsonError::IoError(e)
    }
}

impl From<serde_json::Error> for AtomicJsonError {
    fn from(e: serde_json::Error) -> Self {
        AtomicJsonError::JsonError(e)
    }
}

/// How long and how often to poll for the file lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub poll_interval: Duration,
    pub acquire_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&postkeep_core::config::LockConfig> for LockOptions {
    fn from(config: &postkeep_core::config::LockConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            acquire_timeout: config.acquire_timeout(),
        }
    }
}

/// A handle to an atomic JSON file with ACID guarantees.
///
/// Provides:
/// - **Atomicity**: Updates are all-or-nothing via tmp file + atomic rename
/// - **Consistency**: JSON schema validation on load/save
/// - **Isolation**: An exclusive advisory lock serializes read-modify-write cycles
/// - **Durability**: Explicit fsync before rename
pub struct AtomicJsonFile<T> {
    path: PathBuf,
    lock: LockOptions,
    _phantom: PhantomData<T>,
}

impl<T> AtomicJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a new atomic JSON file handle.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: LockOptions::default(),
            _phantom: PhantomData,
        }
    }

    pub fn with_lock_options(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the JSON file and deserializes it.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>, AtomicJsonError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let data: T = serde_json::from_str(&content)?;
        Ok(Some(data))
    }

    /// Saves data to the JSON file atomically.
    ///
    /// Uses a temporary file + atomic rename, so a concurrent reader sees either
    /// the previous content or the new content, never a mix.
    pub fn save(&self, data: &T) -> Result<(), AtomicJsonError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(data)?;

        let tmp_path = self.get_temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Performs a transactional read-modify-write under the exclusive lock.
    ///
    /// `init` supplies the value when the file is missing. A file that no longer
    /// parses is moved aside (see [`Self::quarantine`]) and also replaced by
    /// `init`. The result of `f` is returned; the file is written only if `f`
    /// succeeds.
    pub fn update<R, E, I, F>(&self, init: I, f: F) -> Result<R, E>
    where
        E: From<AtomicJsonError>,
        I: FnOnce() -> T,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let _lock = FileLock::acquire(&self.path, self.lock)?;

        let mut data = match self.load() {
            Ok(Some(data)) => data,
            Ok(None) => init(),
            Err(AtomicJsonError::JsonError(e)) => {
                let moved_to = self.quarantine()?;
                tracing::warn!(
                    "[AtomicJson] {} is corrupt ({}); moved to {} and starting empty",
                    self.path.display(),
                    e,
                    moved_to.display()
                );
                init()
            }
            Err(e) => return Err(e.into()),
        };

        let result = f(&mut data)?;
        self.save(&data)?;

        Ok(result)
    }

    /// Removes the file under the lock. Missing files are fine.
    pub fn remove(&self) -> Result<(), AtomicJsonError> {
        let _lock = FileLock::acquire(&self.path, self.lock)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves an unparseable file aside so its bytes survive for inspection.
    fn quarantine(&self) -> Result<PathBuf, AtomicJsonError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".corrupt-{}", stamp));
        let target = PathBuf::from(name);
        fs::rename(&self.path, &target)?;
        Ok(target)
    }

    /// Gets a temporary file path for atomic writes.
    fn get_temp_path(&self) -> Result<PathBuf, AtomicJsonError> {
        let parent = self.path.parent().ok_or_else(|| {
            AtomicJsonError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        })?;

        let file_name = self.path.file_name().ok_or_else(|| {
            AtomicJsonError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no file name",
            ))
        })?;

        let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
        Ok(parent.join(tmp_name))
    }
}

/// Path of the sibling lock file for `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

/// An exclusive lock guard; released when dropped.
///
/// The lock is an OS advisory lock on a sibling `.lock` file, so a process that
/// dies while holding it releases it automatically. The lock file itself is left
/// in place: unlinking it while another writer waits on it would let two writers
/// hold locks on different inodes.
struct FileLock {
    file: File,
}

impl FileLock {
    /// Polls for the lock every `options.poll_interval` until `options.acquire_timeout`.
    fn acquire(path: &Path, options: LockOptions) -> Result<Self, AtomicJsonError> {
        let lock_path = lock_path_for(path);

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(FileLock { file }),
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= options.acquire_timeout {
                        return Err(AtomicJsonError::LockTimeout {
                            path: lock_path,
                            waited,
                        });
                    }
                    std::thread::sleep(options.poll_interval);
                }
                Err(e) => {
                    return Err(AtomicJsonError::LockError(format!(
                        "Failed to acquire lock: {}",
                        e
                    )));
                }
            }
        }
    }
}

/// Path of the sibling lease file for `path`.
pub fn lease_path_for(path: &Path) -> PathBuf {
    path.with_extension("lease")
}

/// A long-lived exclusive lock marking `path` as owned by a live handle.
///
/// Unlike the per-write lock, a lease spans many writes and is never waited on:
/// other processes only try it once. Like the write lock it dies with its process.
#[derive(Debug)]
pub struct FileLease {
    file: File,
    path: PathBuf,
}

impl FileLease {
    /// Takes the lease, or returns `None` when another handle holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, AtomicJsonError> {
        let lease_path = lease_path_for(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lease_path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(FileLease {
                file,
                path: lease_path,
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(AtomicJsonError::LockError(format!(
                "Failed to acquire lease: {}",
                e
            ))),
        }
    }

    /// Unlinks the lease file, then releases the lease.
    pub fn release_and_remove(self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("[AtomicJson] Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the handle would release it too; unlock explicitly first
        let _ = FileExt::unlock(&self.file);
    }
}
