//! Error types for the stateful parts of tagtrace.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading or writing the linkage store.
///
/// Load-time failures are recovered by the store itself (it starts empty in
/// degraded mode); only write failures reach callers, including a refused
/// write over a file that could not be read.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store {} is corrupted: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("Refusing to overwrite store {} that could not be read: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to serialize store: {0}")]
    Serialize(String),
}

/// Errors raised by advisory locks.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Timed out after {waited:?} waiting for lock {} (held by {holder})", path.display())]
    Timeout {
        path: PathBuf,
        waited: Duration,
        holder: String,
    },

    #[error("Lock IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock is not held")]
    NotHeld,
}

/// Errors from [`crate::TraceContext`] operations.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TraceResult<T> = Result<T, TraceError>;
