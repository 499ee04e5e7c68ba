//! Store configuration
//!
//! Paths default to the current directory and can be overridden through
//! environment variables:
//!
//! | Variable                        | Default          |
//! |---------------------------------|------------------|
//! | `LABEL_STORE_DIR`               | `./data`         |
//! | `LABEL_STORE_NODES`             | `<dir>/nodes.jsonl` |
//! | `LABEL_STORE_WRITER_TIMEOUT_MS` | `30000`          |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_DATA_DIR: &str = "LABEL_STORE_DIR";
pub const ENV_NODE_STORE: &str = "LABEL_STORE_NODES";
pub const ENV_WRITER_TIMEOUT_MS: &str = "LABEL_STORE_WRITER_TIMEOUT_MS";

const DEFAULT_WRITER_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a label scan store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; the index lives in `<data_dir>/label-index`
    pub data_dir: PathBuf,
    /// Node log replayed on rebuild. `None` means `<data_dir>/nodes.jsonl`.
    pub node_store_path: Option<PathBuf>,
    /// How long a bounded writer request waits for the writer lock
    pub writer_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            node_store_path: None,
            writer_timeout: DEFAULT_WRITER_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Config rooted at `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Read overrides from the environment.
    ///
    /// Relative paths are resolved against the current directory. An
    /// unparseable timeout is logged and the default kept.
    pub fn from_env() -> Self {
        let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::new(current_dir.join("data"));

        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            config.data_dir = resolve(&current_dir, &dir);
        }
        if let Ok(path) = env::var(ENV_NODE_STORE) {
            config.node_store_path = Some(resolve(&current_dir, &path));
        }
        if let Ok(ms) = env::var(ENV_WRITER_TIMEOUT_MS) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.writer_timeout = Duration::from_millis(ms),
                Err(e) => warn!(
                    value = %ms,
                    error = %e,
                    "ignoring invalid {}", ENV_WRITER_TIMEOUT_MS
                ),
            }
        }

        config
    }

    pub fn with_node_store<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.node_store_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_writer_timeout(mut self, timeout: Duration) -> Self {
        self.writer_timeout = timeout;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the label index generations and lock file
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("label-index")
    }

    pub fn node_store_path(&self) -> PathBuf {
        self.node_store_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("nodes.jsonl"))
    }
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
