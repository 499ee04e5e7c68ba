//! Write handles that publish into a shared index state

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::EngineResult;
use crate::types::NodeLabelUpdate;

use super::LabelIndexState;

/// Mutation operations offered by a write handle
pub trait LabelWriter: Send {
    /// Stage one node label change
    fn write(&mut self, update: NodeLabelUpdate) -> EngineResult<()>;

    /// Make every staged change visible to new readers
    fn commit(&mut self) -> EngineResult<()>;
}

/// State shared between an opened engine, its readers and its writer
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Arc<LabelIndexState>>,
    /// Set by commits, cleared once the engine has flushed
    dirty: AtomicBool,
    /// Incremented on every commit
    version: AtomicU64,
}

impl SharedIndex {
    pub fn new(state: LabelIndexState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
            dirty: AtomicBool::new(false),
            version: AtomicU64::new(0),
        }
    }

    /// The most recently committed state
    pub fn current(&self) -> Arc<LabelIndexState> {
        Arc::clone(&self.current.read())
    }

    pub fn publish(&self, state: LabelIndexState) {
        *self.current.write() = Arc::new(state);
        self.version.fetch_add(1, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag and return the state to persist, if any.
    ///
    /// On a failed flush the caller must `mark_dirty` again.
    pub fn take_dirty(&self) -> Option<Arc<LabelIndexState>> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            Some(self.current())
        } else {
            None
        }
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Writer staging changes on a private copy of the committed state
#[derive(Debug)]
pub struct IndexWriter {
    shared: Arc<SharedIndex>,
    working: LabelIndexState,
    pending: usize,
}

impl IndexWriter {
    pub fn new(shared: Arc<SharedIndex>) -> Self {
        let working = LabelIndexState::clone(&shared.current());
        Self {
            shared,
            working,
            pending: 0,
        }
    }

    /// Updates staged since the last commit
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl LabelWriter for IndexWriter {
    fn write(&mut self, update: NodeLabelUpdate) -> EngineResult<()> {
        if !update.is_noop() {
            self.working.apply(&update);
            self.pending += 1;
        }
        Ok(())
    }

    fn commit(&mut self) -> EngineResult<()> {
        if self.pending > 0 {
            self.shared.publish(self.working.clone());
            self.pending = 0;
        }
        Ok(())
    }
}
