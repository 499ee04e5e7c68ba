//! Index engine abstraction
//!
//! The lifecycle manager never touches index files itself; it drives an
//! `IndexEngine` through existence checks, validation, create/open/close,
//! flushes, file snapshots and reader/writer acquisition.
//!
//! Implementations:
//! - `FsLabelIndex`: durable, generation files in a directory
//! - `MemoryLabelIndex`: volatile, with fault injection for tests

mod fs_index;
mod memory;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineResult;
use crate::index::{LabelReader, LabelWriter};

pub use self::fs_index::FsLabelIndex;
pub use self::memory::MemoryLabelIndex;

/// Capabilities the lifecycle manager needs from an index engine.
///
/// Engines must be usable from many threads at once. They do not have to
/// serialize writers themselves; the store guarantees at most one live
/// writer.
pub trait IndexEngine: Send + Sync {
    type Reader: LabelReader;
    type Writer: LabelWriter;

    /// Human-readable on-disk location, used in error messages
    fn location(&self) -> String;

    /// Whether an index has ever been created at the location.
    ///
    /// Fails if the location cannot be inspected; an unreadable location is
    /// never reported as missing.
    fn exists(&self) -> EngineResult<bool>;

    /// Check that an existing index can be read
    fn validate(&self) -> EngineResult<()>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Create an empty, unpopulated index.
    ///
    /// Fails with `EngineError::AlreadyExists` when one is already present.
    fn create(&self) -> EngineResult<()>;

    /// Whether the durable index holds a completed full rebuild.
    ///
    /// False from `create()` until `mark_populated()` succeeds.
    fn is_populated(&self) -> EngineResult<bool>;

    /// Open the index for use, taking exclusive ownership of it.
    ///
    /// Fails with `EngineError::LockContention` when another owner holds it.
    fn open(&self) -> EngineResult<()>;

    /// Release everything `open` acquired. Safe to call when not open.
    fn close(&self) -> EngineResult<()>;

    /// Like `close`, but drop commits that were not flushed yet
    fn discard(&self) -> EngineResult<()>;

    /// Make every committed change durable
    fn flush(&self) -> EngineResult<()>;

    /// Reset the committed state to empty and unpopulated. Needs `open`.
    fn clear(&self) -> EngineResult<()>;

    /// Flush the committed state and record it as populated
    fn mark_populated(&self) -> EngineResult<()>;

    /// Point-in-time set of files making up the durable index
    fn snapshot(&self) -> EngineResult<StoreFileSnapshot>;

    /// A read view of the committed state
    fn reader(&self) -> EngineResult<Self::Reader>;

    /// A write handle staging changes until commit
    fn writer(&self) -> EngineResult<Self::Writer>;

    /// Bytes used by the durable index
    fn disk_usage(&self) -> EngineResult<u64> {
        Ok(0)
    }
}

impl<E: IndexEngine> IndexEngine for Arc<E> {
    type Reader = E::Reader;
    type Writer = E::Writer;

    fn location(&self) -> String {
        (**self).location()
    }

    fn exists(&self) -> EngineResult<bool> {
        (**self).exists()
    }

    fn validate(&self) -> EngineResult<()> {
        (**self).validate()
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn create(&self) -> EngineResult<()> {
        (**self).create()
    }

    fn is_populated(&self) -> EngineResult<bool> {
        (**self).is_populated()
    }

    fn open(&self) -> EngineResult<()> {
        (**self).open()
    }

    fn close(&self) -> EngineResult<()> {
        (**self).close()
    }

    fn discard(&self) -> EngineResult<()> {
        (**self).discard()
    }

    fn flush(&self) -> EngineResult<()> {
        (**self).flush()
    }

    fn clear(&self) -> EngineResult<()> {
        (**self).clear()
    }

    fn mark_populated(&self) -> EngineResult<()> {
        (**self).mark_populated()
    }

    fn snapshot(&self) -> EngineResult<StoreFileSnapshot> {
        (**self).snapshot()
    }

    fn reader(&self) -> EngineResult<Self::Reader> {
        (**self).reader()
    }

    fn writer(&self) -> EngineResult<Self::Writer> {
        (**self).writer()
    }

    fn disk_usage(&self) -> EngineResult<u64> {
        (**self).disk_usage()
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Files of one consistent index version.
///
/// While the snapshot is alive the engine keeps these files in place, so they
/// can be copied at leisure. Dropping the snapshot releases them.
pub struct StoreFileSnapshot {
    files: Vec<PathBuf>,
    release: Option<ReleaseFn>,
}

impl StoreFileSnapshot {
    /// A snapshot whose files need no pinning
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            release: None,
        }
    }

    /// A snapshot that runs `release` when dropped
    pub fn pinned<F>(files: Vec<PathBuf>, release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            files,
            release: Some(Box::new(release)),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copy every file into `dest`, keeping file names. Returns the copies.
    pub fn copy_to<P: AsRef<Path>>(&self, dest: P) -> io::Result<Vec<PathBuf>> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;

        let mut copied = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let name = file.file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("snapshot entry has no file name: {}", file.display()),
                )
            })?;
            let target = dest.join(name);
            fs::copy(file, &target)?;
            copied.push(target);
        }
        crate::utils::sync_dir(dest)?;

        Ok(copied)
    }
}

impl Drop for StoreFileSnapshot {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for StoreFileSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFileSnapshot")
            .field("files", &self.files)
            .field("pinned", &self.release.is_some())
            .finish()
    }
}

impl<'a> IntoIterator for &'a StoreFileSnapshot {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
