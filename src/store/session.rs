//! Exclusive write sessions

use crate::error::{EngineResult, StoreError, StoreResult};
use crate::index::LabelWriter;
use crate::lock::WriterPermit;
use crate::types::NodeLabelUpdate;

/// The single live writer of a store.
///
/// Owns the writer permit for its whole life. `close()` commits the staged
/// updates; dropping the session without closing discards them. Either way
/// the permit is released exactly once, when the session goes away.
#[derive(Debug)]
pub struct WriteSession<W> {
    writer: W,
    permit: WriterPermit,
}

impl<W: LabelWriter> WriteSession<W> {
    pub(crate) fn new(writer: W, permit: WriterPermit) -> Self {
        Self { writer, permit }
    }

    /// Stage one node label change
    pub fn write(&mut self, update: NodeLabelUpdate) -> StoreResult<()> {
        self.writer.write(update).map_err(StoreError::Storage)
    }

    /// Commit staged changes and release the writer lock
    pub fn close(mut self) -> StoreResult<()> {
        self.writer.commit().map_err(StoreError::Storage)
    }

    /// Grant order of this session among all sessions of the store
    pub fn ticket(&self) -> u64 {
        self.permit.ticket()
    }
}

impl<W: LabelWriter> LabelWriter for WriteSession<W> {
    fn write(&mut self, update: NodeLabelUpdate) -> EngineResult<()> {
        self.writer.write(update)
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.writer.commit()
    }
}
