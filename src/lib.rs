//! Label Scan Store
//!
//! A secondary index answering "which nodes carry label L?" for a graph
//! store, with a lifecycle manager that owns the index for its whole life.
//!
//! # Features
//!
//! - **Typestate lifecycle**: init → start ⇄ stop → shutdown, enforced by types
//! - **Rebuild on first use**: a missing index is rebuilt from the node store
//! - **Fail fast on corruption**: a corrupt index is reported, never silently rebuilt
//! - **Single fair writer**: writers are served in request order, readers never block
//! - **Consistent snapshots**: index files pinned for backup while writes continue
//!
//! # Modules
//!
//! - `store`: Lifecycle manager, write sessions and stats
//! - `engine`: Index engine trait plus the filesystem and in-memory engines
//! - `index`: Persistent in-memory label index with reader/writer views
//! - `stream`: Full-store change streams used to rebuild the index
//! - `lock`: FIFO writer lock
//! - `monitor`: Lifecycle event callbacks
//! - `config`: Paths and timeouts, overridable from the environment
//! - `types`: Identifiers, label updates and on-disk headers
//! - `utils`: Atomic file writes and timestamps
//!
//! # Example
//!
//! ```no_run
//! use label_scan_store::{FsLabelIndex, LabelScanStore, NodeLabelUpdate, NodeStore, NodeStoreStream};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = FsLabelIndex::new("data/label-index");
//!     let stream = NodeStoreStream::new(NodeStore::new("data/nodes.jsonl"));
//!
//!     let store = LabelScanStore::new(engine, stream).init()?.start()?;
//!
//!     let mut writer = store.new_writer()?;
//!     writer.write(NodeLabelUpdate::added(42, vec![1, 2]))?;
//!     writer.close()?;
//!     store.force()?;
//!
//!     store.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod lock;
pub mod monitor;
pub mod store;
pub mod stream;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::StoreConfig;
pub use engine::{FsLabelIndex, IndexEngine, MemoryLabelIndex, StoreFileSnapshot};
pub use error::{ChangeStreamError, EngineError, StoreError, StoreResult};
pub use index::{LabelReader, LabelWriter};
pub use monitor::{Monitor, NoopMonitor};
pub use store::{
    IndexStats, InitializedStore, LabelScanStore, StartedStore, StoppedStore, WriteSession,
};
pub use stream::{EmptyChangeStream, FullStoreChangeStream, NodeRecord, NodeStore, NodeStoreStream};
pub use types::{LabelId, NodeId, NodeLabelUpdate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
