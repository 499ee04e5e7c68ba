//! Append-only node label log and its full-replay stream
//!
//! Each line of the log is a `NodeRecord`. The last record for a node id
//! wins; a record with no labels means the node carries none (or is gone).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChangeStreamError, ChangeStreamResult};
use crate::index::LabelWriter;
use crate::types::{LabelId, NodeId, NodeLabelUpdate};

use super::FullStoreChangeStream;

/// The labels of one node at the time the record was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

impl NodeRecord {
    pub fn new(id: NodeId, labels: impl Into<Vec<LabelId>>) -> Self {
        Self {
            id,
            labels: labels.into(),
        }
    }
}

/// Authoritative node label log stored as JSON lines
#[derive(Debug, Clone)]
pub struct NodeStore {
    path: PathBuf,
}

impl NodeStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and sync it to disk
    pub fn append(&self, record: &NodeRecord) -> ChangeStreamResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.sync_all()?;

        Ok(())
    }

    /// Latest labels of every node ever recorded
    pub fn load_latest(&self) -> ChangeStreamResult<BTreeMap<NodeId, Vec<LabelId>>> {
        let mut nodes = BTreeMap::new();

        if !self.path.exists() {
            return Ok(nodes);
        }

        let reader = BufReader::new(File::open(&self.path)?);
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            let record: NodeRecord =
                serde_json::from_str(&line).map_err(|e| ChangeStreamError::Malformed {
                    line: line_num + 1,
                    reason: e.to_string(),
                })?;
            nodes.insert(record.id, record.labels);
        }

        Ok(nodes)
    }

    /// Labels currently recorded for `node`
    pub fn labels_of(&self, node: NodeId) -> ChangeStreamResult<Vec<LabelId>> {
        Ok(self.load_latest()?.remove(&node).unwrap_or_default())
    }

    /// Give `node` the extra `labels`, staging the index change in `writer`
    /// before recording it here.
    ///
    /// The log is the source of truth and the index is derived from it. If
    /// the index rejects the change, nothing is recorded. The caller commits
    /// `writer` afterwards; a commit that fails after this returns leaves the
    /// index behind the log until it is rebuilt.
    pub fn add_labels(
        &self,
        writer: &mut dyn LabelWriter,
        node: NodeId,
        labels: &[LabelId],
    ) -> ChangeStreamResult<NodeLabelUpdate> {
        let before = self.labels_of(node)?;
        let mut after = before.clone();
        after.extend_from_slice(labels);

        let update = NodeLabelUpdate::new(node, before, after);
        if update.is_noop() {
            return Ok(update);
        }

        writer.write(update.clone())?;
        self.append(&NodeRecord::new(node, update.labels_after.clone()))?;
        Ok(update)
    }
}

/// Replays a `NodeStore` into an index writer
#[derive(Debug, Clone)]
pub struct NodeStoreStream {
    store: NodeStore,
}

impl NodeStoreStream {
    pub fn new(store: NodeStore) -> Self {
        Self { store }
    }
}

impl FullStoreChangeStream for NodeStoreStream {
    fn apply_to(&self, writer: &mut dyn LabelWriter) -> ChangeStreamResult<u64> {
        let nodes = self.store.load_latest()?;
        let node_count = nodes.len() as u64;

        for (id, labels) in nodes {
            if !labels.is_empty() {
                writer.write(NodeLabelUpdate::added(id, labels))?;
            }
        }

        debug!(nodes = node_count, path = %self.store.path().display(), "replayed node store");
        Ok(node_count)
    }
}
