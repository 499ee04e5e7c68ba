//! Lifecycle observation hooks
//!
//! A `Monitor` is told about the interesting transitions of a store: first
//! use, corruption, lock contention and rebuilds. Every method has an empty
//! default, so implementors only override what they care about.

use crate::error::EngineError;

pub trait Monitor: Send + Sync {
    /// `init()` has begun
    fn init(&self) {}

    /// No index existed; an empty one is being created and will be rebuilt
    fn no_index(&self) {}

    /// Opening failed because another owner holds the index
    fn locked_index(&self, _cause: &EngineError) {}

    /// The index exists but could not be read
    fn corrupt_index(&self, _cause: &EngineError) {}

    /// A full rebuild from the change stream is starting
    fn rebuilding(&self) {}

    /// A full rebuild finished, having seen roughly this many nodes
    fn rebuilt(&self, _approximate_node_count: u64) {}
}

impl<M: Monitor + ?Sized> Monitor for std::sync::Arc<M> {
    fn init(&self) {
        (**self).init()
    }

    fn no_index(&self) {
        (**self).no_index()
    }

    fn locked_index(&self, cause: &EngineError) {
        (**self).locked_index(cause)
    }

    fn corrupt_index(&self, cause: &EngineError) {
        (**self).corrupt_index(cause)
    }

    fn rebuilding(&self) {
        (**self).rebuilding()
    }

    fn rebuilt(&self, approximate_node_count: u64) {
        (**self).rebuilt(approximate_node_count)
    }
}

/// Monitor that ignores every event; the default for new stores
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {}
