//! Label Scan Store - lifecycle manager for the label index
//!
//! Owns one index engine and drives it through its lifecycle:
//!
//! ```text
//! LabelScanStore ──init()──► InitializedStore ──start()──► StartedStore ◄──start()── StoppedStore
//!  (unopened)               {needs_rebuild}     (rebuild   │      │ stop()──────────────►  │
//!                                               if needed) │  shutdown()             shutdown()
//!                                                          ▼                              ▼
//!                                                       engine closed ◄───────────────────┘
//! ```
//!
//! Each state is its own type and every transition consumes the previous
//! one, so out-of-order calls do not compile. A started store is shared
//! freely between threads: readers, flushes and snapshots never wait on the
//! writer lock; writers queue on it in request order.

mod session;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::engine::{IndexEngine, StoreFileSnapshot};
use crate::error::{StoreError, StoreResult};
use crate::index::LabelReader;
use crate::lock::FairLock;
use crate::monitor::{Monitor, NoopMonitor};
use crate::stream::FullStoreChangeStream;

pub use session::WriteSession;
pub use stats::IndexStats;

/// Parts shared by every lifecycle state
struct StoreCore<E, S> {
    engine: E,
    /// Only replayed when the index had to be created from scratch
    change_stream: S,
    monitor: Arc<dyn Monitor>,
    writer_lock: Arc<FairLock>,
}

impl<E, S> StoreCore<E, S>
where
    E: IndexEngine,
    S: FullStoreChangeStream,
{
    fn new_writer(&self) -> StoreResult<WriteSession<E::Writer>> {
        let permit = self.writer_lock.acquire();
        let writer = self.engine.writer()?;
        Ok(WriteSession::new(writer, permit))
    }

    fn try_new_writer(&self, timeout: Duration) -> StoreResult<Option<WriteSession<E::Writer>>> {
        let Some(permit) = self.writer_lock.try_acquire_for(timeout) else {
            return Ok(None);
        };
        let writer = self.engine.writer()?;
        Ok(Some(WriteSession::new(writer, permit)))
    }

    /// Replay the change stream into an emptied index, then durably mark it
    /// populated. Until that last step a crash leaves the index unpopulated.
    fn rebuild(&self) -> StoreResult<u64> {
        self.engine.clear()?;
        let mut session = self.new_writer()?;
        let node_count = self.change_stream.apply_to(&mut session)?;
        session.close()?;
        self.engine.mark_populated()?;
        Ok(node_count)
    }

    fn close_engine(&self) -> StoreResult<()> {
        self.engine.close()?;
        Ok(())
    }

    /// Close after a failed open; the first failure wins
    fn close_quietly(&self) {
        if let Err(e) = self.engine.close() {
            warn!(location = %self.engine.location(), error = %e, "failed to close label scan store index");
        }
    }

    /// Close after a failed rebuild without persisting its partial state
    fn discard_quietly(&self) {
        if let Err(e) = self.engine.discard() {
            warn!(location = %self.engine.location(), error = %e, "failed to close label scan store index");
        }
    }
}

/// A label scan store that has not been initialized yet
pub struct LabelScanStore<E, S> {
    core: StoreCore<E, S>,
}

impl<E, S> LabelScanStore<E, S>
where
    E: IndexEngine,
    S: FullStoreChangeStream,
{
    /// Create a store over `engine`, rebuilding from `change_stream` if needed
    pub fn new(engine: E, change_stream: S) -> Self {
        Self {
            core: StoreCore {
                engine,
                change_stream,
                monitor: Arc::new(NoopMonitor),
                writer_lock: Arc::new(FairLock::new()),
            },
        }
    }

    /// Report lifecycle events to `monitor`
    pub fn with_monitor<M: Monitor + 'static>(mut self, monitor: M) -> Self {
        self.core.monitor = Arc::new(monitor);
        self
    }

    pub fn location(&self) -> String {
        self.core.engine.location()
    }

    /// Inspect the index, creating it if missing, and open it.
    ///
    /// A missing index is created empty and flagged for rebuild at `start()`.
    /// So is an index whose earlier rebuild never completed.
    /// A corrupt index fails with `StoreError::Corrupt`; nothing is rebuilt
    /// automatically. Lock contention on open fails with `StoreError::Locked`
    /// after closing the engine.
    pub fn init(self) -> StoreResult<InitializedStore<E, S>> {
        let core = self.core;
        core.monitor.init();

        let location = core.engine.location();
        let mut needs_rebuild = false;

        if !core.engine.exists()? {
            info!(
                location = %location,
                "No label scan store index found, this might just be first use. Preparing to rebuild."
            );
            core.monitor.no_index();
            core.engine.create()?;
            needs_rebuild = true;
        } else if let Err(cause) = core.engine.validate() {
            warn!(location = %location, error = %cause, "Label scan store index could not be read");
            core.monitor.corrupt_index(&cause);
            return Err(StoreError::Corrupt { location, cause });
        } else if !core.engine.is_populated()? {
            info!(
                location = %location,
                "Label scan store index was never completely built, the previous rebuild was interrupted. Preparing to rebuild."
            );
            core.monitor.no_index();
            needs_rebuild = true;
        }

        if let Err(cause) = core.engine.open() {
            core.close_quietly();
            if cause.is_lock_contention() {
                error!(location = %location, error = %cause, "Index is locked by another process or store");
                core.monitor.locked_index(&cause);
                return Err(StoreError::Locked { location, cause });
            }
            return Err(StoreError::Storage(cause));
        }

        Ok(InitializedStore {
            core,
            needs_rebuild,
        })
    }
}

/// An opened store that may still need its full rebuild
pub struct InitializedStore<E, S> {
    core: StoreCore<E, S>,
    needs_rebuild: bool,
}

impl<E, S> InitializedStore<E, S>
where
    E: IndexEngine,
    S: FullStoreChangeStream,
{
    /// Whether `start()` will rebuild the index from the change stream
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn location(&self) -> String {
        self.core.engine.location()
    }

    /// Rebuild if `init()` created the index, then serve requests.
    ///
    /// A failed rebuild closes the engine without flushing and is returned as
    /// `StoreError::Rebuild`. It is not retried here; the next `init()` sees
    /// the index as unpopulated and rebuilds again.
    pub fn start(self) -> StoreResult<StartedStore<E, S>> {
        let core = self.core;

        if self.needs_rebuild {
            core.monitor.rebuilding();
            info!(location = %core.engine.location(), "Rebuilding label scan store, this may take a while");

            let node_count = match core.rebuild() {
                Ok(node_count) => node_count,
                Err(e) => {
                    error!(location = %core.engine.location(), error = %e, "Label scan store rebuild failed");
                    core.discard_quietly();
                    return Err(e);
                }
            };

            core.monitor.rebuilt(node_count);
            info!("Label scan store rebuilt (roughly {} nodes)", node_count);
        }

        Ok(StartedStore { core })
    }

    /// Close the engine without starting
    pub fn shutdown(self) -> StoreResult<()> {
        self.core.close_engine()
    }
}

/// A running store serving readers, one writer at a time, flushes and snapshots
pub struct StartedStore<E, S> {
    core: StoreCore<E, S>,
}

impl<E, S> StartedStore<E, S>
where
    E: IndexEngine,
    S: FullStoreChangeStream,
{
    pub fn location(&self) -> String {
        self.core.engine.location()
    }

    /// Flush every committed write to durable storage
    pub fn force(&self) -> StoreResult<()> {
        self.core.engine.flush().map_err(StoreError::Storage)
    }

    /// A read view; never waits for the writer
    pub fn new_reader(&self) -> StoreResult<E::Reader> {
        Ok(self.core.engine.reader()?)
    }

    /// Block until this caller is the only writer, in request order
    pub fn new_writer(&self) -> StoreResult<WriteSession<E::Writer>> {
        self.core.new_writer()
    }

    /// Like `new_writer`, but give up after `timeout` and return `None`
    pub fn try_new_writer(&self, timeout: Duration) -> StoreResult<Option<WriteSession<E::Writer>>> {
        self.core.try_new_writer(timeout)
    }

    /// Files of the latest durable index version, pinned until dropped.
    ///
    /// Does not take the writer lock. Call `force()` first to include
    /// recently committed writes.
    pub fn snapshot_store_files(&self) -> StoreResult<StoreFileSnapshot> {
        Ok(self.core.engine.snapshot()?)
    }

    pub fn stats(&self) -> StoreResult<IndexStats> {
        let reader = self.core.engine.reader()?;
        Ok(IndexStats {
            label_count: reader.label_count(),
            entry_count: reader.entry_count(),
            disk_bytes: self.core.engine.disk_usage()?,
        })
    }

    /// Whether a write session is currently alive
    pub fn has_active_writer(&self) -> bool {
        self.core.writer_lock.is_held()
    }

    /// Number of callers blocked in `new_writer`
    pub fn queued_writers(&self) -> usize {
        self.core.writer_lock.queued()
    }

    pub fn stop(self) -> StoppedStore<E, S> {
        StoppedStore { core: self.core }
    }

    /// Release every engine resource. The store cannot be used afterwards.
    pub fn shutdown(self) -> StoreResult<()> {
        self.core.close_engine()
    }
}

/// A stopped store; only `start()` and `shutdown()` remain
pub struct StoppedStore<E, S> {
    core: StoreCore<E, S>,
}

impl<E, S> StoppedStore<E, S>
where
    E: IndexEngine,
    S: FullStoreChangeStream,
{
    pub fn start(self) -> StartedStore<E, S> {
        StartedStore { core: self.core }
    }

    pub fn shutdown(self) -> StoreResult<()> {
        self.core.close_engine()
    }
}
