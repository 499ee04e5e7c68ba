//! Read views over a published index state

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::types::{LabelId, NodeId};

use super::LabelIndexState;

/// Lookup operations offered by a read view
pub trait LabelReader: Send {
    /// All nodes carrying `label`, ascending
    fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId>;

    /// All labels carried by `node`, ascending
    fn labels_for_node(&self, node: NodeId) -> Vec<LabelId>;

    /// Nodes carrying at least one of `labels`
    fn nodes_with_any_label(&self, labels: &[LabelId]) -> Vec<NodeId> {
        let mut union = BTreeSet::new();
        for label in labels {
            union.extend(self.nodes_with_label(*label));
        }
        union.into_iter().collect()
    }

    /// Nodes carrying every one of `labels`; empty when `labels` is empty
    fn nodes_with_all_labels(&self, labels: &[LabelId]) -> Vec<NodeId> {
        let Some((first, rest)) = labels.split_first() else {
            return Vec::new();
        };
        let mut result: BTreeSet<NodeId> = self.nodes_with_label(*first).into_iter().collect();
        for label in rest {
            if result.is_empty() {
                break;
            }
            let nodes: BTreeSet<NodeId> = self.nodes_with_label(*label).into_iter().collect();
            result.retain(|node| nodes.contains(node));
        }
        result.into_iter().collect()
    }

    /// Number of labels with at least one node
    fn label_count(&self) -> usize;

    /// Total (label, node) pairs
    fn entry_count(&self) -> usize;
}

/// Read view pinned to the state committed when it was acquired
#[derive(Debug, Clone)]
pub struct IndexReader {
    state: Arc<LabelIndexState>,
}

impl IndexReader {
    pub fn new(state: Arc<LabelIndexState>) -> Self {
        Self { state }
    }
}

impl LabelReader for IndexReader {
    fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId> {
        self.state.nodes_with_label(label)
    }

    fn labels_for_node(&self, node: NodeId) -> Vec<LabelId> {
        self.state.labels_for_node(node)
    }

    fn label_count(&self) -> usize {
        self.state.label_count()
    }

    fn entry_count(&self) -> usize {
        self.state.entry_count()
    }
}
