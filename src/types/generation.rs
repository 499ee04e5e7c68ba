//! Header record written as the first line of every index generation file

use serde::{Deserialize, Serialize};

/// Current generation file format
pub const GENERATION_FORMAT_VERSION: u32 = 1;

/// Metadata for one durable generation of the label index.
///
/// Mirrors the layout of a snapshot file: a single JSON header line followed
/// by one JSON line per label. `checksum` is the CRC32 of every byte after the
/// header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMeta {
    /// Always "generation_meta" to identify this as metadata
    #[serde(rename = "type")]
    pub meta_type: String,

    /// Monotonic generation number, starting at 1
    pub generation: u64,

    /// Unix timestamp (ms) when the generation was written
    pub created_at: i64,

    /// Number of label lines that follow the header
    pub label_count: usize,

    /// Total number of (label, node) entries across all label lines
    pub entry_count: usize,

    /// CRC32 of the body
    pub checksum: u32,

    #[serde(default = "default_version")]
    pub version: u32,

    /// False until a full rebuild has completed and been flushed. An index
    /// that is still unpopulated on open has to be rebuilt again.
    #[serde(default = "default_populated")]
    pub populated: bool,
}

fn default_version() -> u32 {
    GENERATION_FORMAT_VERSION
}

fn default_populated() -> bool {
    true
}

impl GenerationMeta {
    pub fn new(
        generation: u64,
        label_count: usize,
        entry_count: usize,
        checksum: u32,
        populated: bool,
    ) -> Self {
        Self {
            meta_type: "generation_meta".to_string(),
            generation,
            created_at: crate::utils::current_timestamp_ms(),
            label_count,
            entry_count,
            checksum,
            version: GENERATION_FORMAT_VERSION,
            populated,
        }
    }

    /// Parse from JSON string (first line of a generation file)
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Serialize to JSON string
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One body line of a generation file: a label and every node carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: super::LabelId,
    pub nodes: Vec<super::NodeId>,
}
