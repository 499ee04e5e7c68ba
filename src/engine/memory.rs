//! Volatile label index for tests and embedding
//!
//! Behaves like a durable engine whose "disk" is a field: flushes copy the
//! committed state into it, and reopening after `close()` starts from it.
//! Faults can be injected to exercise the lifecycle manager's error paths.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::index::{IndexReader, IndexWriter, LabelIndexState, SharedIndex};

use super::{IndexEngine, StoreFileSnapshot};

#[derive(Default)]
struct MemoryState {
    /// None until `create()` (or a seeded constructor)
    durable: Option<LabelIndexState>,
    /// Populated flag of the durable copy
    populated: bool,
    generation: u64,
    corrupt: bool,
    shared: Option<Arc<SharedIndex>>,
}

/// In-memory engine with fault injection and call counters
#[derive(Default)]
pub struct MemoryLabelIndex {
    name: String,
    state: Mutex<MemoryState>,
    lock_next_open: AtomicBool,
    fail_flushes: AtomicBool,
    create_calls: AtomicUsize,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    flush_calls: AtomicUsize,
}

impl MemoryLabelIndex {
    /// An engine with no index yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An engine whose index already exists, fully populated, with `state`
    pub fn with_state(name: impl Into<String>, state: LabelIndexState) -> Self {
        let index = Self::new(name);
        {
            let mut inner = index.state.lock();
            inner.durable = Some(state);
            inner.populated = true;
            inner.generation = 1;
        }
        index
    }

    /// Make validation fail from now on
    pub fn corrupt(&self) {
        self.state.lock().corrupt = true;
    }

    /// Make the next `open()` fail with lock contention
    pub fn lock_next_open(&self) {
        self.lock_next_open.store(true, Ordering::SeqCst);
    }

    /// Make every flush fail with an I/O error while set
    pub fn fail_flushes(&self, fail: bool) {
        self.fail_flushes.store(fail, Ordering::SeqCst);
    }

    /// The last flushed state, if the index exists
    pub fn durable_state(&self) -> Option<LabelIndexState> {
        self.state.lock().durable.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().shared.is_some()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    fn not_open(&self) -> EngineError {
        EngineError::NotOpen {
            location: self.location(),
        }
    }

    fn release(&self, flush: bool) -> EngineResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        match state.shared.take() {
            Some(shared) if flush => self.flush_locked(&mut state, &shared),
            _ => Ok(()),
        }
    }

    fn flush_locked(&self, state: &mut MemoryState, shared: &SharedIndex) -> EngineResult<()> {
        if self.fail_flushes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected flush failure").into());
        }
        if let Some(committed) = shared.take_dirty() {
            state.durable = Some(LabelIndexState::clone(&committed));
            state.generation += 1;
        }
        Ok(())
    }
}

impl IndexEngine for MemoryLabelIndex {
    type Reader = IndexReader;
    type Writer = IndexWriter;

    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn exists(&self) -> EngineResult<bool> {
        Ok(self.state.lock().durable.is_some())
    }

    fn validate(&self) -> EngineResult<()> {
        let state = self.state.lock();
        if state.corrupt {
            return Err(EngineError::Corrupt {
                location: self.location(),
                reason: "injected corruption".to_string(),
            });
        }
        if state.durable.is_none() {
            return Err(EngineError::Corrupt {
                location: self.location(),
                reason: "no index".to_string(),
            });
        }
        Ok(())
    }

    fn create(&self) -> EngineResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.durable.is_some() {
            return Err(EngineError::AlreadyExists {
                location: self.location(),
                generation: state.generation,
            });
        }
        state.durable = Some(LabelIndexState::new());
        state.populated = false;
        state.generation += 1;
        state.corrupt = false;
        Ok(())
    }

    fn is_populated(&self) -> EngineResult<bool> {
        let state = self.state.lock();
        if state.durable.is_none() {
            return Err(EngineError::Corrupt {
                location: self.location(),
                reason: "no index".to_string(),
            });
        }
        Ok(state.populated)
    }

    fn open(&self) -> EngineResult<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.lock_next_open.swap(false, Ordering::SeqCst) {
            return Err(EngineError::LockContention {
                location: self.location(),
                holder: "injected owner".to_string(),
            });
        }

        let mut state = self.state.lock();
        if state.shared.is_some() {
            return Ok(());
        }
        let durable = state.durable.clone().ok_or_else(|| EngineError::Corrupt {
            location: self.location(),
            reason: "no index to open".to_string(),
        })?;
        state.shared = Some(Arc::new(SharedIndex::new(durable)));
        Ok(())
    }

    fn close(&self) -> EngineResult<()> {
        self.release(true)
    }

    fn discard(&self) -> EngineResult<()> {
        self.release(false)
    }

    fn flush(&self) -> EngineResult<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let shared = state.shared.clone().ok_or_else(|| self.not_open())?;
        self.flush_locked(&mut state, &shared)
    }

    fn clear(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        let shared = state.shared.clone().ok_or_else(|| self.not_open())?;
        state.populated = false;
        shared.publish(LabelIndexState::new());
        Ok(())
    }

    fn mark_populated(&self) -> EngineResult<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let shared = state.shared.clone().ok_or_else(|| self.not_open())?;
        if state.populated && !shared.is_dirty() {
            return Ok(());
        }
        shared.mark_dirty();
        self.flush_locked(&mut state, &shared)?;
        state.populated = true;
        Ok(())
    }

    fn snapshot(&self) -> EngineResult<StoreFileSnapshot> {
        let state = self.state.lock();
        if state.shared.is_none() {
            return Err(self.not_open());
        }
        Ok(StoreFileSnapshot::new(vec![PathBuf::from(format!(
            "{}/labels-{}",
            self.location(),
            state.generation
        ))]))
    }

    fn reader(&self) -> EngineResult<IndexReader> {
        let state = self.state.lock();
        let shared = state.shared.as_ref().ok_or_else(|| self.not_open())?;
        Ok(IndexReader::new(shared.current()))
    }

    fn writer(&self) -> EngineResult<IndexWriter> {
        let state = self.state.lock();
        let shared = state.shared.as_ref().ok_or_else(|| self.not_open())?;
        Ok(IndexWriter::new(Arc::clone(shared)))
    }
}
