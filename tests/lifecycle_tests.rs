//! Lifecycle integration tests
//!
//! Drives the store over the in-memory engine:
//! - rebuild on first use, exactly once
//! - fail fast on a corrupt index
//! - lock contention at init
//! - fair single-writer access and reader isolation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use label_scan_store::error::ChangeStreamResult;
use label_scan_store::index::LabelIndexState;
use label_scan_store::{
    EmptyChangeStream, EngineError, LabelReader, LabelScanStore, LabelWriter, MemoryLabelIndex,
    Monitor, NodeLabelUpdate, StoreError,
};

#[derive(Default)]
struct RecordingMonitor {
    events: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl Monitor for RecordingMonitor {
    fn init(&self) {
        self.record("init");
    }

    fn no_index(&self) {
        self.record("no_index");
    }

    fn locked_index(&self, _cause: &EngineError) {
        self.record("locked_index");
    }

    fn corrupt_index(&self, _cause: &EngineError) {
        self.record("corrupt_index");
    }

    fn rebuilding(&self) {
        self.record("rebuilding");
    }

    fn rebuilt(&self, approximate_node_count: u64) {
        self.record(format!("rebuilt({})", approximate_node_count));
    }
}

fn existing_engine() -> Arc<MemoryLabelIndex> {
    Arc::new(MemoryLabelIndex::with_state("labels", LabelIndexState::new()))
}

#[test]
fn test_first_use_rebuilds_from_change_stream() {
    let engine = Arc::new(MemoryLabelIndex::new("labels"));
    let monitor = Arc::new(RecordingMonitor::default());
    let replays = Arc::new(AtomicUsize::new(0));

    let replay_counter = Arc::clone(&replays);
    let stream = move |writer: &mut dyn LabelWriter| -> ChangeStreamResult<u64> {
        replay_counter.fetch_add(1, Ordering::SeqCst);
        for node in 0..1000u64 {
            writer.write(NodeLabelUpdate::added(node, vec![(node % 3) as u32]))?;
        }
        Ok(1000)
    };

    let initialized = LabelScanStore::new(Arc::clone(&engine), stream)
        .with_monitor(Arc::clone(&monitor))
        .init()
        .unwrap();
    assert!(initialized.needs_rebuild());

    let store = initialized.start().unwrap();

    assert_eq!(replays.load(Ordering::SeqCst), 1);
    assert_eq!(
        monitor.events(),
        vec!["init", "no_index", "rebuilding", "rebuilt(1000)"]
    );

    let reader = store.new_reader().unwrap();
    assert_eq!(reader.entry_count(), 1000);
    assert_eq!(reader.nodes_with_label(0).len(), 334);
    assert_eq!(reader.labels_for_node(5), vec![2]);

    // Restarting the same store never rebuilds again
    let store = store.stop().start();
    assert_eq!(replays.load(Ordering::SeqCst), 1);
    store.shutdown().unwrap();

    // Neither does a fresh store over the now-existing index
    let initialized = LabelScanStore::new(Arc::clone(&engine), EmptyChangeStream)
        .init()
        .unwrap();
    assert!(!initialized.needs_rebuild());
    let store = initialized.start().unwrap();
    assert_eq!(store.new_reader().unwrap().entry_count(), 1000);
    store.shutdown().unwrap();
}

#[test]
fn test_corrupt_index_is_never_started() {
    let engine = existing_engine();
    engine.corrupt();
    let monitor = Arc::new(RecordingMonitor::default());
    let replays = Arc::new(AtomicUsize::new(0));

    let replay_counter = Arc::clone(&replays);
    let stream = move |_writer: &mut dyn LabelWriter| -> ChangeStreamResult<u64> {
        replay_counter.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    };

    let err = LabelScanStore::new(Arc::clone(&engine), stream)
        .with_monitor(Arc::clone(&monitor))
        .init()
        .err()
        .expect("corrupt index must not initialize");

    match &err {
        StoreError::Corrupt { location, cause } => {
            assert_eq!(location, "memory://labels");
            assert!(matches!(cause, EngineError::Corrupt { .. }));
        }
        other => panic!("expected corrupt error, got {:?}", other),
    }
    assert!(err.to_string().contains("delete the files in 'memory://labels'"));

    assert_eq!(monitor.count("corrupt_index"), 1);
    assert_eq!(monitor.count("rebuilding"), 0);
    assert_eq!(replays.load(Ordering::SeqCst), 0);
    assert_eq!(engine.create_calls(), 0);
    assert!(!engine.is_open());
}

#[test]
fn test_locked_index_closes_engine_and_reports_once() {
    let engine = existing_engine();
    engine.lock_next_open();
    let monitor = Arc::new(RecordingMonitor::default());

    let result = LabelScanStore::new(Arc::clone(&engine), EmptyChangeStream)
        .with_monitor(Arc::clone(&monitor))
        .init();

    match result {
        Err(StoreError::Locked { location, cause }) => {
            assert_eq!(location, "memory://labels");
            assert!(cause.is_lock_contention());
        }
        Err(other) => panic!("expected locked error, got {:?}", other),
        Ok(_) => panic!("locked index must not initialize"),
    }
    assert_eq!(engine.close_calls(), 1);
    assert_eq!(monitor.count("locked_index"), 1);

    // Once the other owner is gone the same engine opens normally
    let store = LabelScanStore::new(Arc::clone(&engine), EmptyChangeStream)
        .init()
        .unwrap()
        .start()
        .unwrap();
    store.shutdown().unwrap();
}

#[test]
fn test_writers_are_served_in_request_order() {
    let store = Arc::new(
        LabelScanStore::new(existing_engine(), EmptyChangeStream)
            .init()
            .unwrap()
            .start()
            .unwrap(),
    );

    // W1 holds the lock while W2 and W3 queue up in that order
    let first = store.new_writer().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for name in ["W2", "W3"] {
        let queued_before = store.queued_writers();
        let thread_store = Arc::clone(&store);
        let order = Arc::clone(&order);
        handles.push(thread::spawn(move || {
            let mut writer = thread_store.new_writer().unwrap();
            order.lock().push(name);
            writer.write(NodeLabelUpdate::added(2, vec![9])).unwrap();
            writer.close().unwrap();
        }));
        while store.queued_writers() == queued_before {
            thread::sleep(Duration::from_millis(1));
        }
    }

    thread::sleep(Duration::from_millis(20));
    assert!(order.lock().is_empty());

    first.close().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*order.lock(), vec!["W2", "W3"]);
    assert!(!store.has_active_writer());
}

#[test]
fn test_at_most_one_live_writer() {
    let store = Arc::new(
        LabelScanStore::new(existing_engine(), EmptyChangeStream)
            .init()
            .unwrap()
            .start()
            .unwrap(),
    );
    let live = Arc::new(AtomicUsize::new(0));
    let max_live = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8u64)
        .map(|id| {
            let store = Arc::clone(&store);
            let live = Arc::clone(&live);
            let max_live = Arc::clone(&max_live);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..10u64 {
                    let mut writer = store.new_writer().unwrap();
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(now, Ordering::SeqCst);
                    writer
                        .write(NodeLabelUpdate::added(id * 100 + round, vec![1]))
                        .unwrap();
                    live.fetch_sub(1, Ordering::SeqCst);
                    writer.close().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_live.load(Ordering::SeqCst), 1);
    assert_eq!(store.new_reader().unwrap().nodes_with_label(1).len(), 80);
}

#[test]
fn test_readers_do_not_wait_for_writer() {
    let store = LabelScanStore::new(existing_engine(), EmptyChangeStream)
        .init()
        .unwrap()
        .start()
        .unwrap();

    let mut setup = store.new_writer().unwrap();
    setup.write(NodeLabelUpdate::added(1, vec![1])).unwrap();
    setup.close().unwrap();

    let before = store.new_reader().unwrap();
    let mut writer = store.new_writer().unwrap();
    writer.write(NodeLabelUpdate::added(2, vec![1])).unwrap();

    // Readers, flushes and snapshots all proceed while the writer is live
    let during = store.new_reader().unwrap();
    assert_eq!(during.nodes_with_label(1), vec![1]);
    store.force().unwrap();
    let snapshot = store.snapshot_store_files().unwrap();
    assert_eq!(snapshot.len(), 1);

    writer.close().unwrap();

    assert_eq!(before.nodes_with_label(1), vec![1]);
    assert_eq!(store.new_reader().unwrap().nodes_with_label(1), vec![1, 2]);
}

#[test]
fn test_label_changes_are_diffed() {
    let store = LabelScanStore::new(existing_engine(), EmptyChangeStream)
        .init()
        .unwrap()
        .start()
        .unwrap();

    let mut writer = store.new_writer().unwrap();
    writer.write(NodeLabelUpdate::added(7, vec![1, 2])).unwrap();
    writer.write(NodeLabelUpdate::new(7, vec![1, 2], vec![2, 3])).unwrap();
    writer.close().unwrap();

    let reader = store.new_reader().unwrap();
    assert!(reader.nodes_with_label(1).is_empty());
    assert_eq!(reader.labels_for_node(7), vec![2, 3]);

    let mut writer = store.new_writer().unwrap();
    writer.write(NodeLabelUpdate::removed(7, vec![2, 3])).unwrap();
    writer.close().unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.label_count, 0);
    assert_eq!(stats.entry_count, 0);
}
