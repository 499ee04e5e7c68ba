//! Data types shared by the index engines and the lifecycle manager

mod generation;
mod label;

pub use generation::{GenerationMeta, LabelEntry, GENERATION_FORMAT_VERSION};
pub use label::{LabelId, NodeId, NodeLabelUpdate};
