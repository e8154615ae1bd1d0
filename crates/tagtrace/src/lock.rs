//! Advisory locks around linkage store read-modify-write sequences
//!
//! ## Lock file format
//! Path: `<store_path>.lock` (e.g. `.tagtrace/linkage.json.lock`).
//! While held it contains JSON [`LockMetadata`]; it is emptied, not deleted,
//! on release.

use crate::error::LockError;
use facet::Facet;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cross-process or in-process mutual exclusion.
pub trait AdvisoryLock: Send + Sync {
    /// Block until the lock is held or `timeout` has passed.
    fn acquire(&self, timeout: Duration) -> Result<(), LockError>;

    /// Release a held lock.
    fn release(&self) -> Result<(), LockError>;
}

/// Releases the lock when dropped.
pub struct LockGuard<'a> {
    lock: &'a dyn AdvisoryLock,
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(lock: &'a dyn AdvisoryLock, timeout: Duration) -> Result<Self, LockError> {
        lock.acquire(timeout)?;
        Ok(Self {
            lock,
            released: false,
        })
    }

    /// Release now and report failures instead of logging them.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.lock.release()
        {
            warn!("Failed to release lock: {}", e);
        }
    }
}

// =============================================================================
// LockMetadata
// =============================================================================

/// Written into the lock file by the holder.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct LockMetadata {
    pub pid: u32,
    pub host: String,
    /// Milliseconds since the Unix epoch
    pub acquired_at_ms: u64,
}

impl LockMetadata {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at_ms: now_ms(),
        }
    }

    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.acquired_at_ms))
    }

    pub fn describe(&self) -> String {
        format!(
            "pid {} on {} for {}s",
            self.pid,
            self.host,
            self.age().as_secs()
        )
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// FileLock
// =============================================================================

/// `fs2` exclusive lock on a lock file, polled until a timeout.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
    stale_after: Duration,
    held: Mutex<Option<File>>,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_TIMEOUT,
            held: Mutex::new(None),
        }
    }

    /// The lock guarding a store file.
    pub fn for_store(store_path: &Path) -> Self {
        let mut name = store_path.as_os_str().to_owned();
        name.push(".lock");
        Self::new(PathBuf::from(name))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Holders older than this are reclaimed.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current holder as recorded in the lock file.
    pub fn holder(&self) -> Option<LockMetadata> {
        read_metadata(&self.path)
    }

    fn open(&self) -> Result<File, LockError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?)
    }

    /// Remove a lock file whose holder is past the stale threshold.
    /// Returns whether the file was reclaimed.
    fn reclaim_if_stale(&self, holder: Option<&LockMetadata>) -> Result<bool, LockError> {
        let Some(holder) = holder else {
            return Ok(false);
        };
        if holder.age() < self.stale_after {
            return Ok(false);
        }
        // Another process may have reclaimed and re-acquired since `holder`
        // was read; only remove the file if it still names the stale holder.
        if read_metadata(&self.path).as_ref() != Some(holder) {
            return Ok(false);
        }
        warn!(
            pid = holder.pid,
            host = %holder.host,
            "Reclaiming stale lock {}",
            self.path.display()
        );
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

impl AdvisoryLock for FileLock {
    fn acquire(&self, timeout: Duration) -> Result<(), LockError> {
        let start = Instant::now();
        let contended = fs2::lock_contended_error();

        loop {
            let mut file = self.open()?;
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    let metadata = LockMetadata::current();
                    let json = facet_json::to_string(&metadata)
                        .map_err(|e| LockError::Io(std::io::Error::other(e.to_string())))?;
                    file.set_len(0)?;
                    file.write_all(json.as_bytes())?;
                    file.sync_all()?;
                    debug!("Acquired lock {}", self.path.display());
                    *self.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
                    return Ok(());
                }
                Err(e) if e.raw_os_error() == contended.raw_os_error() => {
                    drop(file);
                    let holder = read_metadata(&self.path);
                    if self.reclaim_if_stale(holder.as_ref())? {
                        continue;
                    }

                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(LockError::Timeout {
                            path: self.path.clone(),
                            waited,
                            holder: holder
                                .map(|h| h.describe())
                                .unwrap_or_else(|| "unknown holder".to_string()),
                        });
                    }
                    debug!("Lock {} is busy, retrying", self.path.display());
                    std::thread::sleep(self.poll_interval.min(timeout - waited));
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
    }

    fn release(&self) -> Result<(), LockError> {
        let file = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(LockError::NotHeld)?;
        file.set_len(0)?;
        FileExt::unlock(&file)?;
        debug!("Released lock {}", self.path.display());
        Ok(())
    }
}

fn read_metadata(path: &Path) -> Option<LockMetadata> {
    let mut content = String::new();
    File::open(path).ok()?.read_to_string(&mut content).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    facet_json::from_str(&content).ok()
}

// =============================================================================
// MemoryLock
// =============================================================================

/// In-process lock with the same contract as [`FileLock`].
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AdvisoryLock for MemoryLock {
    fn acquire(&self, timeout: Duration) -> Result<(), LockError> {
        let start = Instant::now();
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut held, result) = self
            .released
            .wait_timeout_while(held, timeout, |held| *held)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && *held {
            return Err(LockError::Timeout {
                path: PathBuf::from("<memory>"),
                waited: start.elapsed(),
                holder: "another thread".to_string(),
            });
        }
        *held = true;
        Ok(())
    }

    fn release(&self) -> Result<(), LockError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !*held {
            return Err(LockError::NotHeld);
        }
        *held = false;
        self.released.notify_one();
        Ok(())
    }
}
