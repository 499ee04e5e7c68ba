//! Authoritative change streams used to rebuild the index
//!
//! A `FullStoreChangeStream` replays the complete label state of every node
//! into a writer. The store runs it once, at start, when the index had to be
//! created from scratch.

mod node_store;

use crate::error::ChangeStreamResult;
use crate::index::LabelWriter;

pub use node_store::{NodeRecord, NodeStore, NodeStoreStream};

/// Source of the complete authoritative label state
pub trait FullStoreChangeStream: Send + Sync {
    /// Write every node's labels into `writer`.
    ///
    /// Returns roughly how many nodes were processed. The caller commits.
    fn apply_to(&self, writer: &mut dyn LabelWriter) -> ChangeStreamResult<u64>;
}

impl<F> FullStoreChangeStream for F
where
    F: Fn(&mut dyn LabelWriter) -> ChangeStreamResult<u64> + Send + Sync,
{
    fn apply_to(&self, writer: &mut dyn LabelWriter) -> ChangeStreamResult<u64> {
        self(writer)
    }
}

/// A stream with no nodes, for stores that are never expected to rebuild
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyChangeStream;

impl FullStoreChangeStream for EmptyChangeStream {
    fn apply_to(&self, _writer: &mut dyn LabelWriter) -> ChangeStreamResult<u64> {
        Ok(0)
    }
}
