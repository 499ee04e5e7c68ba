//! Directory-backed label index
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   write.lock                     OS advisory lock, holds owner pid
//!   labels-00000000000000000007.jsonl
//!   labels-00000000000000000008.jsonl   newest generation wins
//! ```
//!
//! Every flush writes a complete new generation file atomically and then
//! deletes older generations, except those pinned by a live snapshot. A
//! generation file is a header line (`GenerationMeta`) followed by one
//! `LabelEntry` per line; the header carries a CRC32 of the body.
//!
//! `create()` writes generation 1 with `populated: false`. The flag stays
//! false in every generation this index writes until `mark_populated()`, so
//! an index whose first rebuild never finished is recognizable after a crash.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::index::{IndexReader, IndexWriter, LabelIndexState, SharedIndex};
use crate::types::{GenerationMeta, LabelEntry, GENERATION_FORMAT_VERSION};
use crate::utils::{atomic_write_with, cleanup_temp_files};

use super::{IndexEngine, StoreFileSnapshot};

const LOCK_FILE: &str = "write.lock";
const GENERATION_PREFIX: &str = "labels-";
const GENERATION_SUFFIX: &str = ".jsonl";

/// Durable label index stored as generation files in one directory
pub struct FsLabelIndex {
    dir: PathBuf,
    inner: Mutex<OpenState>,
    pins: Arc<Mutex<PinTable>>,
}

#[derive(Default)]
struct OpenState {
    lock_file: Option<File>,
    shared: Option<Arc<SharedIndex>>,
    generation: u64,
    /// Carried into every generation this handle writes
    populated: bool,
}

/// Reference counts of generations held by live snapshots
struct PinTable {
    dir: PathBuf,
    latest: u64,
    pins: HashMap<u64, usize>,
}

impl PinTable {
    fn pin(&mut self, generation: u64) {
        *self.pins.entry(generation).or_insert(0) += 1;
    }

    fn unpin(&mut self, generation: u64) {
        let Some(count) = self.pins.get_mut(&generation) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.pins.remove(&generation);

        if generation < self.latest {
            let path = generation_path(&self.dir, generation);
            match fs::remove_file(&path) {
                Ok(()) => debug!(generation, "removed released snapshot generation"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove released generation"),
            }
        }
    }

    fn is_pinned(&self, generation: u64) -> bool {
        self.pins.contains_key(&generation)
    }
}

impl FsLabelIndex {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            pins: Arc::new(Mutex::new(PinTable {
                dir: dir.clone(),
                latest: 0,
                pins: HashMap::new(),
            })),
            dir,
            inner: Mutex::new(OpenState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Newest durable generation number, 0 when the index is not open
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Generation numbers present on disk, ascending
    pub fn generations(&self) -> io::Result<Vec<u64>> {
        list_generations(&self.dir)
    }

    fn corrupt(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Corrupt {
            location: self.location(),
            reason: reason.into(),
        }
    }

    fn not_open(&self) -> EngineError {
        EngineError::NotOpen {
            location: self.location(),
        }
    }

    fn latest_generation(&self) -> EngineResult<u64> {
        let generations = list_generations(&self.dir)?;
        generations
            .last()
            .copied()
            .ok_or_else(|| self.corrupt("no generation files found"))
    }

    /// Read and verify one generation file
    fn read_generation(&self, generation: u64) -> EngineResult<(GenerationMeta, LabelIndexState)> {
        let path = generation_path(&self.dir, generation);
        let bytes = fs::read(&path)?;

        let header_end = bytes
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| self.corrupt(format!("{}: missing header line", path.display())))?;
        let header = std::str::from_utf8(&bytes[..header_end])
            .map_err(|e| self.corrupt(format!("{}: header is not UTF-8: {}", path.display(), e)))?;
        let meta = GenerationMeta::from_json_line(header)
            .map_err(|e| self.corrupt(format!("{}: unreadable header: {}", path.display(), e)))?;

        if meta.version > GENERATION_FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "{}: unsupported format version {}",
                path.display(),
                meta.version
            )));
        }
        if meta.generation != generation {
            return Err(self.corrupt(format!(
                "{}: header names generation {}",
                path.display(),
                meta.generation
            )));
        }

        let body = &bytes[header_end + 1..];
        let checksum = crc32fast::hash(body);
        if checksum != meta.checksum {
            return Err(self.corrupt(format!(
                "{}: checksum mismatch (expected {:08x}, found {:08x})",
                path.display(),
                meta.checksum,
                checksum
            )));
        }

        let mut entries = Vec::with_capacity(meta.label_count);
        for (line_num, line) in body.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let entry: LabelEntry = serde_json::from_slice(line).map_err(|e| {
                self.corrupt(format!("{}: bad entry at line {}: {}", path.display(), line_num + 2, e))
            })?;
            entries.push(entry);
        }

        if entries.len() != meta.label_count {
            return Err(self.corrupt(format!(
                "{}: expected {} labels, found {}",
                path.display(),
                meta.label_count,
                entries.len()
            )));
        }

        let state = LabelIndexState::from_entries(entries);
        if state.entry_count() != meta.entry_count {
            return Err(self.corrupt(format!(
                "{}: expected {} entries, found {}",
                path.display(),
                meta.entry_count,
                state.entry_count()
            )));
        }

        Ok((meta, state))
    }

    fn write_generation(
        &self,
        generation: u64,
        state: &LabelIndexState,
        populated: bool,
    ) -> EngineResult<GenerationMeta> {
        let mut body = Vec::new();
        for entry in state.entries() {
            serde_json::to_writer(&mut body, &entry)?;
            body.push(b'\n');
        }

        let meta = GenerationMeta::new(
            generation,
            state.label_count(),
            state.entry_count(),
            crc32fast::hash(&body),
            populated,
        );
        let header = meta.to_json_line()?;

        atomic_write_with(generation_path(&self.dir, generation), |file| {
            writeln!(file, "{}", header)?;
            file.write_all(&body)
        })?;

        debug!(
            generation,
            labels = meta.label_count,
            entries = meta.entry_count,
            populated,
            "wrote label index generation"
        );
        Ok(meta)
    }

    /// Remove generations older than `latest` that no snapshot holds
    fn prune(&self, latest: u64) {
        let generations = match list_generations(&self.dir) {
            Ok(generations) => generations,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to list generations for pruning");
                return;
            }
        };

        let pins = self.pins.lock();
        for generation in generations.into_iter().filter(|g| *g < latest) {
            if pins.is_pinned(generation) {
                continue;
            }
            let path = generation_path(&self.dir, generation);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove old generation");
                }
            }
        }
    }

    fn flush_locked(&self, inner: &mut OpenState, shared: &SharedIndex) -> EngineResult<()> {
        let Some(state) = shared.take_dirty() else {
            return Ok(());
        };

        let next = inner.generation + 1;
        if let Err(e) = self.write_generation(next, &state, inner.populated) {
            shared.mark_dirty();
            return Err(e);
        }

        inner.generation = next;
        self.pins.lock().latest = next;
        self.prune(next);
        Ok(())
    }

    /// Drop the open state and the OS lock, flushing first if asked to
    fn release(&self, flush: bool) -> EngineResult<()> {
        let mut inner = self.inner.lock();

        let flushed = match inner.shared.take() {
            Some(shared) if flush => self.flush_locked(&mut inner, &shared),
            Some(shared) => {
                if shared.is_dirty() {
                    debug!(dir = %self.dir.display(), "discarding unflushed label index commits");
                }
                Ok(())
            }
            None => Ok(()),
        };

        if let Some(lock_file) = inner.lock_file.take() {
            if let Err(e) = lock_file.unlock() {
                warn!(error = %e, "failed to release index lock explicitly");
            }
        }
        inner.generation = 0;
        inner.populated = false;

        flushed
    }

    fn acquire_lock_file(&self) -> EngineResult<File> {
        let path = self.lock_path();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let holder = fs::read_to_string(&path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "unknown owner".to_string());
                return Err(EngineError::LockContention {
                    location: self.location(),
                    holder,
                });
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        file.set_len(0)?;
        writeln!(file, "pid {}", std::process::id())?;
        file.sync_all()?;
        Ok(file)
    }
}

impl IndexEngine for FsLabelIndex {
    type Reader = IndexReader;
    type Writer = IndexWriter;

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn exists(&self) -> EngineResult<bool> {
        Ok(!list_generations(&self.dir)?.is_empty())
    }

    fn validate(&self) -> EngineResult<()> {
        let latest = self.latest_generation()?;
        self.read_generation(latest).map(|_| ())
    }

    fn create(&self) -> EngineResult<()> {
        fs::create_dir_all(&self.dir)?;
        if let Some(&generation) = list_generations(&self.dir)?.last() {
            return Err(EngineError::AlreadyExists {
                location: self.location(),
                generation,
            });
        }
        self.write_generation(1, &LabelIndexState::new(), false)?;
        Ok(())
    }

    fn is_populated(&self) -> EngineResult<bool> {
        let latest = self.latest_generation()?;
        let (meta, _) = self.read_generation(latest)?;
        Ok(meta.populated)
    }

    fn open(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.shared.is_some() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)?;
        let lock_file = self.acquire_lock_file()?;
        // Keep the lock even if loading fails; close() releases it.
        inner.lock_file = Some(lock_file);

        let cleaned = cleanup_temp_files(&self.dir)?;
        if cleaned > 0 {
            debug!(cleaned, "removed interrupted generation writes");
        }

        let latest = self.latest_generation()?;
        let (meta, state) = self.read_generation(latest)?;

        inner.generation = meta.generation;
        inner.populated = meta.populated;
        inner.shared = Some(Arc::new(SharedIndex::new(state)));
        self.pins.lock().latest = meta.generation;
        self.prune(meta.generation);

        debug!(generation = meta.generation, dir = %self.dir.display(), "opened label index");
        Ok(())
    }

    fn close(&self) -> EngineResult<()> {
        self.release(true)
    }

    fn discard(&self) -> EngineResult<()> {
        self.release(false)
    }

    fn flush(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let shared = inner.shared.clone().ok_or_else(|| self.not_open())?;
        self.flush_locked(&mut inner, &shared)
    }

    fn clear(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let shared = inner.shared.clone().ok_or_else(|| self.not_open())?;
        inner.populated = false;
        shared.publish(LabelIndexState::new());
        Ok(())
    }

    fn mark_populated(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let shared = inner.shared.clone().ok_or_else(|| self.not_open())?;
        if inner.populated && !shared.is_dirty() {
            return Ok(());
        }

        let was_populated = inner.populated;
        inner.populated = true;
        shared.mark_dirty();
        if let Err(e) = self.flush_locked(&mut inner, &shared) {
            inner.populated = was_populated;
            return Err(e);
        }
        debug!(generation = inner.generation, "label index marked populated");
        Ok(())
    }

    fn snapshot(&self) -> EngineResult<StoreFileSnapshot> {
        let inner = self.inner.lock();
        if inner.shared.is_none() {
            return Err(self.not_open());
        }

        let generation = inner.generation;
        self.pins.lock().pin(generation);
        drop(inner);

        debug!(generation, "pinned generation for snapshot");
        let pins = Arc::clone(&self.pins);
        Ok(StoreFileSnapshot::pinned(
            vec![generation_path(&self.dir, generation)],
            move || pins.lock().unpin(generation),
        ))
    }

    fn reader(&self) -> EngineResult<IndexReader> {
        let inner = self.inner.lock();
        let shared = inner.shared.as_ref().ok_or_else(|| self.not_open())?;
        Ok(IndexReader::new(shared.current()))
    }

    fn writer(&self) -> EngineResult<IndexWriter> {
        let inner = self.inner.lock();
        let shared = inner.shared.as_ref().ok_or_else(|| self.not_open())?;
        Ok(IndexWriter::new(Arc::clone(shared)))
    }

    fn disk_usage(&self) -> EngineResult<u64> {
        let mut total = 0;
        for generation in list_generations(&self.dir)? {
            match fs::metadata(generation_path(&self.dir, generation)) {
                Ok(meta) => total += meta.len(),
                // pruned since listing
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }
}

impl Drop for FsLabelIndex {
    fn drop(&mut self) {
        if self.inner.get_mut().shared.is_some() {
            if let Err(e) = self.close() {
                warn!(dir = %self.dir.display(), error = %e, "failed to close label index on drop");
            }
        }
    }
}

fn generation_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{:020}{}", GENERATION_PREFIX, generation, GENERATION_SUFFIX))
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?
        .strip_suffix(GENERATION_SUFFIX)?
        .parse()
        .ok()
}

fn list_generations(dir: &Path) -> io::Result<Vec<u64>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut generations = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(generation) = entry.file_name().to_str().and_then(parse_generation) {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{LabelReader, LabelWriter};
    use crate::types::NodeLabelUpdate;
    use tempfile::TempDir;

    fn open_index(dir: &Path) -> FsLabelIndex {
        let index = FsLabelIndex::new(dir);
        if !index.exists().unwrap() {
            index.create().unwrap();
        }
        index.open().unwrap();
        index
    }

    fn write(index: &FsLabelIndex, updates: Vec<NodeLabelUpdate>) {
        let mut writer = index.writer().unwrap();
        for update in updates {
            writer.write(update).unwrap();
        }
        writer.commit().unwrap();
    }

    #[test]
    fn test_generation_names() {
        let path = generation_path(Path::new("/x"), 42);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "labels-00000000000000000042.jsonl");
        assert_eq!(parse_generation(name), Some(42));
        assert_eq!(parse_generation("labels-1.tmp"), None);
        assert_eq!(parse_generation("write.lock"), None);
    }

    #[test]
    fn test_create_makes_valid_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = FsLabelIndex::new(temp_dir.path().join("labels"));

        assert!(!index.exists().unwrap());
        index.create().unwrap();
        assert!(index.exists().unwrap());
        assert!(index.is_valid());
        assert!(!index.is_populated().unwrap());
        assert_eq!(index.generations().unwrap(), vec![1]);
    }

    #[test]
    fn test_create_refuses_existing_index() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open_index(temp_dir.path());
            write(&index, vec![NodeLabelUpdate::added(1, vec![1])]);
            index.flush().unwrap();
            index.close().unwrap();
        }

        let index = FsLabelIndex::new(temp_dir.path());
        let err = index.create().unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { generation: 2, .. }));

        index.open().unwrap();
        assert_eq!(index.generations().unwrap(), vec![2]);
        assert_eq!(index.reader().unwrap().nodes_with_label(1), vec![1]);
    }

    #[test]
    fn test_exists_reports_unreadable_location() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_dir = temp_dir.path().join("labels");
        fs::write(&not_a_dir, "plain file").unwrap();

        let index = FsLabelIndex::new(&not_a_dir);
        assert!(matches!(index.exists(), Err(EngineError::Io(_))));
    }

    #[test]
    fn test_populated_flag_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open_index(temp_dir.path());
            write(&index, vec![NodeLabelUpdate::added(1, vec![1])]);
            index.flush().unwrap();
            index.close().unwrap();
        }

        // flushed data alone does not make the index populated
        let index = open_index(temp_dir.path());
        assert!(!index.is_populated().unwrap());

        index.mark_populated().unwrap();
        assert!(index.is_populated().unwrap());
        assert_eq!(index.generations().unwrap(), vec![3]);
        index.close().unwrap();

        let index = open_index(temp_dir.path());
        assert!(index.is_populated().unwrap());
        assert_eq!(index.reader().unwrap().nodes_with_label(1), vec![1]);

        // already populated and clean: no new generation
        index.mark_populated().unwrap();
        assert_eq!(index.generations().unwrap(), vec![3]);
    }

    #[test]
    fn test_clear_resets_to_unpopulated() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(temp_dir.path());
        write(&index, vec![NodeLabelUpdate::added(1, vec![1])]);
        index.mark_populated().unwrap();

        index.clear().unwrap();
        assert!(index.reader().unwrap().nodes_with_label(1).is_empty());
        index.flush().unwrap();
        assert!(!index.is_populated().unwrap());
    }

    #[test]
    fn test_discard_drops_unflushed_commits() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open_index(temp_dir.path());
            write(&index, vec![NodeLabelUpdate::added(1, vec![1])]);
            index.discard().unwrap();
            assert_eq!(index.generations().unwrap(), vec![1]);
        }

        let index = open_index(temp_dir.path());
        assert!(index.reader().unwrap().nodes_with_label(1).is_empty());
    }

    #[test]
    fn test_flush_writes_next_generation_and_prunes() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(temp_dir.path());

        write(&index, vec![NodeLabelUpdate::added(1, vec![5])]);
        index.flush().unwrap();
        assert_eq!(index.generation(), 2);
        assert_eq!(index.generations().unwrap(), vec![2]);

        // nothing committed since: no new generation
        index.flush().unwrap();
        assert_eq!(index.generation(), 2);
    }

    #[test]
    fn test_reopen_sees_flushed_state() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open_index(temp_dir.path());
            write(&index, vec![NodeLabelUpdate::added(9, vec![1, 2])]);
            index.flush().unwrap();
            index.close().unwrap();
        }

        let index = open_index(temp_dir.path());
        let reader = index.reader().unwrap();
        assert_eq!(reader.labels_for_node(9), vec![1, 2]);
    }

    #[test]
    fn test_close_flushes_pending_commits() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open_index(temp_dir.path());
            write(&index, vec![NodeLabelUpdate::added(3, vec![4])]);
            index.close().unwrap();
        }

        let index = open_index(temp_dir.path());
        assert_eq!(index.reader().unwrap().nodes_with_label(4), vec![3]);
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let index = FsLabelIndex::new(temp_dir.path());
        index.create().unwrap();

        let path = generation_path(temp_dir.path(), 1);
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{\"label\":1,\"nodes\":[1]}\n");
        fs::write(&path, content).unwrap();

        assert!(matches!(index.validate(), Err(EngineError::Corrupt { .. })));
    }

    #[test]
    fn test_garbage_header_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(generation_path(temp_dir.path(), 1), "not json\n").unwrap();

        let index = FsLabelIndex::new(temp_dir.path());
        assert!(index.exists().unwrap());
        assert!(!index.is_valid());
    }

    #[test]
    fn test_second_open_is_lock_contention() {
        let temp_dir = TempDir::new().unwrap();
        let first = open_index(temp_dir.path());

        let second = FsLabelIndex::new(temp_dir.path());
        let err = second.open().unwrap_err();
        assert!(err.is_lock_contention(), "unexpected error: {}", err);
        second.close().unwrap();

        first.close().unwrap();
        second.open().unwrap();
    }

    #[test]
    fn test_snapshot_pins_generation_across_flush() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(temp_dir.path());
        write(&index, vec![NodeLabelUpdate::added(1, vec![1])]);
        index.flush().unwrap();

        let snapshot = index.snapshot().unwrap();
        let pinned = snapshot.files()[0].clone();

        write(&index, vec![NodeLabelUpdate::added(2, vec![1])]);
        index.flush().unwrap();
        assert!(pinned.exists());
        assert_eq!(index.generations().unwrap(), vec![2, 3]);

        drop(snapshot);
        assert!(!pinned.exists());
        assert_eq!(index.generations().unwrap(), vec![3]);
    }

    #[test]
    fn test_operations_require_open() {
        let temp_dir = TempDir::new().unwrap();
        let index = FsLabelIndex::new(temp_dir.path());
        index.create().unwrap();

        assert!(matches!(index.flush(), Err(EngineError::NotOpen { .. })));
        assert!(matches!(index.reader(), Err(EngineError::NotOpen { .. })));
        assert!(index.snapshot().is_err());
        index.close().unwrap();
    }

    #[test]
    fn test_open_cleans_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let index = FsLabelIndex::new(temp_dir.path());
        index.create().unwrap();
        fs::write(temp_dir.path().join("labels-00000000000000000002.tmp"), "partial").unwrap();

        index.open().unwrap();
        assert!(!temp_dir.path().join("labels-00000000000000000002.tmp").exists());
    }
}
