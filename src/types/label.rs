//! Label and node identifiers, and the change records applied to the index

use serde::{Deserialize, Serialize};

/// Identifier of a label (the categorical index key)
pub type LabelId = u32;

/// Identifier of a node (the indexed entity)
pub type NodeId = u64;

/// A change in the label set of a single node.
///
/// Applying an update removes the node from every label present only in
/// `labels_before` and adds it to every label present only in `labels_after`.
/// Both label lists are kept sorted and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabelUpdate {
    pub node_id: NodeId,
    pub labels_before: Vec<LabelId>,
    pub labels_after: Vec<LabelId>,
}

impl NodeLabelUpdate {
    /// Create an update describing a label change from `before` to `after`
    pub fn new(node_id: NodeId, before: impl Into<Vec<LabelId>>, after: impl Into<Vec<LabelId>>) -> Self {
        Self {
            node_id,
            labels_before: normalize(before.into()),
            labels_after: normalize(after.into()),
        }
    }

    /// A node that previously had no labels now has `labels`
    pub fn added(node_id: NodeId, labels: impl Into<Vec<LabelId>>) -> Self {
        Self::new(node_id, Vec::new(), labels)
    }

    /// A node that had `labels` now has none (e.g. it was deleted)
    pub fn removed(node_id: NodeId, labels: impl Into<Vec<LabelId>>) -> Self {
        Self::new(node_id, labels, Vec::new())
    }

    /// Labels the node gains with this update
    pub fn labels_added(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels_after
            .iter()
            .copied()
            .filter(|label| self.labels_before.binary_search(label).is_err())
    }

    /// Labels the node loses with this update
    pub fn labels_removed(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels_before
            .iter()
            .copied()
            .filter(|label| self.labels_after.binary_search(label).is_err())
    }

    /// True when applying the update changes nothing
    pub fn is_noop(&self) -> bool {
        self.labels_before == self.labels_after
    }
}

fn normalize(mut labels: Vec<LabelId>) -> Vec<LabelId> {
    labels.sort_unstable();
    labels.dedup();
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_normalized() {
        let update = NodeLabelUpdate::new(1, vec![3, 1, 3], vec![2, 2]);
        assert_eq!(update.labels_before, vec![1, 3]);
        assert_eq!(update.labels_after, vec![2]);
    }

    #[test]
    fn test_added_and_removed_labels() {
        let update = NodeLabelUpdate::new(7, vec![1, 2, 3], vec![2, 3, 4]);
        assert_eq!(update.labels_added().collect::<Vec<_>>(), vec![4]);
        assert_eq!(update.labels_removed().collect::<Vec<_>>(), vec![1]);
        assert!(!update.is_noop());
    }

    #[test]
    fn test_noop_update() {
        let update = NodeLabelUpdate::new(7, vec![2, 1], vec![1, 2]);
        assert!(update.is_noop());
        assert_eq!(update.labels_added().count(), 0);
    }
}
