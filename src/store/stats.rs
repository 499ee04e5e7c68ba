//! Index statistics

use serde::Serialize;

/// Size of the label index as seen by a fresh reader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Labels with at least one node
    pub label_count: usize,
    /// Total (label, node) pairs
    pub entry_count: usize,
    /// Bytes used by the durable index files
    pub disk_bytes: u64,
}

impl IndexStats {
    /// Format size in human-readable format
    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} labels, {} entries, {} on disk",
            self.label_count,
            self.entry_count,
            Self::format_size(self.disk_bytes)
        )
    }
}
