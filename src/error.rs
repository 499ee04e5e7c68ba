//! Error types for the label scan store
//!
//! Three layers, each wrapping the one below:
//! - `EngineError`: failures reported by an index engine
//! - `ChangeStreamError`: failures while replaying the authoritative store
//! - `StoreError`: what callers of the lifecycle manager see

use std::io;

use thiserror::Error;

/// Result type for index engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for change stream replays
pub type ChangeStreamResult<T> = Result<T, ChangeStreamError>;

/// Result type for lifecycle manager operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by an index engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another process or handle holds the index open for writing
    #[error("index at '{location}' is locked by another owner: {holder}")]
    LockContention { location: String, holder: String },

    /// The on-disk index exists but cannot be read
    #[error("index at '{location}' is corrupt: {reason}")]
    Corrupt { location: String, reason: String },

    /// The operation needs an opened index
    #[error("index at '{location}' is not open")]
    NotOpen { location: String },

    /// `create()` found an index already in place
    #[error("index at '{location}' already exists (generation {generation})")]
    AlreadyExists { location: String, generation: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// True for the lock-contention category
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, EngineError::LockContention { .. })
    }
}

/// Errors raised while replaying the authoritative store into a writer
#[derive(Debug, Error)]
pub enum ChangeStreamError {
    #[error("node store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed node record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("failed to write into index: {0}")]
    Write(#[from] EngineError),
}

/// Errors surfaced by the lifecycle manager
#[derive(Debug, Error)]
pub enum StoreError {
    /// Found at init; the store never auto-rebuilds a corrupt index
    #[error(
        "label scan store could not be read, and needs to be rebuilt. To trigger a rebuild, \
         ensure the process is stopped, delete the files in '{location}', and then start it again"
    )]
    Corrupt {
        location: String,
        #[source]
        cause: EngineError,
    },

    /// Found at init; the engine was closed before this was returned
    #[error("label scan store at '{location}' is locked by another process or store")]
    Locked {
        location: String,
        #[source]
        cause: EngineError,
    },

    /// Underlying storage failure (flush, open, read, write, snapshot)
    #[error("underlying storage failure: {0}")]
    Storage(#[from] EngineError),

    /// The full rebuild at start could not complete
    #[error("label scan store rebuild failed: {0}")]
    Rebuild(#[from] ChangeStreamError),
}
