//! In-memory label index model
//!
//! Uses persistent maps so that cloning a state is O(1). Readers keep an
//! immutable snapshot while a writer mutates its own clone.

use im::{OrdMap, OrdSet};

use crate::types::{LabelEntry, LabelId, NodeId, NodeLabelUpdate};

/// label → set of nodes carrying it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndexState {
    labels: OrdMap<LabelId, OrdSet<NodeId>>,
    entry_count: usize,
}

impl LabelIndexState {
    /// Create an empty index state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from serialized label entries
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = LabelEntry>,
    {
        let mut state = Self::new();
        for entry in entries {
            let nodes: OrdSet<NodeId> = entry.nodes.into_iter().collect();
            if nodes.is_empty() {
                continue;
            }
            let mut merged = state.labels.get(&entry.label).cloned().unwrap_or_default();
            let before = merged.len();
            merged.extend(nodes);
            state.entry_count += merged.len() - before;
            state.labels.insert(entry.label, merged);
        }
        state
    }

    /// Apply a single node label change. Re-applying an update is harmless.
    pub fn apply(&mut self, update: &NodeLabelUpdate) {
        let node = update.node_id;

        for label in update.labels_removed() {
            if let Some(mut nodes) = self.labels.get(&label).cloned() {
                if nodes.remove(&node).is_some() {
                    self.entry_count -= 1;
                }
                if nodes.is_empty() {
                    self.labels.remove(&label);
                } else {
                    self.labels.insert(label, nodes);
                }
            }
        }

        for label in update.labels_added() {
            let mut nodes = self.labels.get(&label).cloned().unwrap_or_default();
            if nodes.insert(node).is_none() {
                self.entry_count += 1;
            }
            self.labels.insert(label, nodes);
        }
    }

    /// All nodes carrying `label`, ascending
    pub fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId> {
        self.labels
            .get(&label)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `node` carries `label`
    pub fn has_label(&self, node: NodeId, label: LabelId) -> bool {
        self.labels
            .get(&label)
            .map(|nodes| nodes.contains(&node))
            .unwrap_or(false)
    }

    /// Every label `node` carries, ascending. Scans all labels.
    pub fn labels_for_node(&self, node: NodeId) -> Vec<LabelId> {
        self.labels
            .iter()
            .filter(|(_, nodes)| nodes.contains(&node))
            .map(|(label, _)| *label)
            .collect()
    }

    /// Number of labels with at least one node
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Total (label, node) pairs
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Serialized form, one entry per label in ascending label order
    pub fn entries(&self) -> impl Iterator<Item = LabelEntry> + '_ {
        self.labels.iter().map(|(label, nodes)| LabelEntry {
            label: *label,
            nodes: nodes.iter().copied().collect(),
        })
    }
}
