//! Label index model shared by the shipped engines
//!
//! - `LabelIndexState`: persistent label → nodes map
//! - `IndexReader` / `LabelReader`: snapshot-isolated lookups
//! - `IndexWriter` / `LabelWriter`: staged updates published on commit

mod reader;
mod state;
mod writer;

pub use reader::{IndexReader, LabelReader};
pub use state::LabelIndexState;
pub use writer::{IndexWriter, LabelWriter, SharedIndex};
