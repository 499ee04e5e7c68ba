//! Label Scan Store - Binary Entry Point
//!
//! Usage:
//!
//! ```text
//! label-scan-store status
//! label-scan-store add <node> <label>...
//! label-scan-store query <label>...
//! label-scan-store backup <dest-dir>
//! ```
//!
//! Every command opens the store, does its work, forces and shuts down.

use std::env;
use std::error::Error;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use label_scan_store::{
    FsLabelIndex, LabelId, LabelReader, LabelScanStore, NodeId, NodeStore, NodeStoreStream,
    StartedStore, StoreConfig,
};

type Store = StartedStore<FsLabelIndex, NodeStoreStream>;
type CliResult<T> = Result<T, Box<dyn Error>>;

const USAGE: &str = "usage: label-scan-store <status | add <node> <label>... | query <label>... | backup <dest-dir>>";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let config = StoreConfig::from_env();
    let result = match command.as_str() {
        "status" => with_store(&config, status),
        "add" => with_store(&config, |store| add(store, &config, rest)),
        "query" => with_store(&config, |store| query(store, rest)),
        "backup" => with_store(&config, |store| backup(store, rest)),
        "--version" | "-V" => {
            println!("{} {}", label_scan_store::NAME, label_scan_store::VERSION);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run `work` against a started store, then force and shut down
fn with_store<F>(config: &StoreConfig, work: F) -> CliResult<()>
where
    F: FnOnce(&Store) -> CliResult<()>,
{
    let engine = FsLabelIndex::new(config.index_dir());
    let stream = NodeStoreStream::new(NodeStore::new(config.node_store_path()));
    let store = LabelScanStore::new(engine, stream).init()?.start()?;

    let outcome = work(&store).and_then(|()| Ok(store.force()?));
    let closed = store.shutdown();

    outcome?;
    closed?;
    Ok(())
}

fn status(store: &Store) -> CliResult<()> {
    let stats = store.stats()?;
    println!("location: {}", store.location());
    println!("{}", stats);
    Ok(())
}

/// Stage the index change, record it in the node store, then commit.
///
/// The node store is the source of truth. A rejected index write records
/// nothing; a failed commit leaves the index behind until it is rebuilt.
fn add(store: &Store, config: &StoreConfig, args: &[String]) -> CliResult<()> {
    let (node, labels) = args.split_first().ok_or(USAGE)?;
    let node: NodeId = node.parse()?;
    let labels = parse_labels(labels)?;
    if labels.is_empty() {
        return Err(USAGE.into());
    }

    let Some(mut writer) = store.try_new_writer(config.writer_timeout)? else {
        return Err(format!(
            "timed out after {:?} waiting for the writer lock",
            config.writer_timeout
        )
        .into());
    };

    let node_store = NodeStore::new(config.node_store_path());
    let update = node_store.add_labels(&mut writer, node, &labels)?;
    writer.close()?;

    info!(node, added = update.labels_added().count(), "labels added");
    Ok(())
}

/// Print the nodes carrying every given label
fn query(store: &Store, args: &[String]) -> CliResult<()> {
    let labels = parse_labels(args)?;
    if labels.is_empty() {
        return Err(USAGE.into());
    }

    let reader = store.new_reader()?;
    for node in reader.nodes_with_all_labels(&labels) {
        println!("{}", node);
    }
    Ok(())
}

fn backup(store: &Store, args: &[String]) -> CliResult<()> {
    let dest = args.first().ok_or(USAGE)?;

    store.force()?;
    let snapshot = store.snapshot_store_files()?;
    let copied = snapshot.copy_to(dest)?;

    for path in &copied {
        println!("{}", path.display());
    }
    info!(files = copied.len(), dest = %dest, "backup complete");
    Ok(())
}

fn parse_labels(args: &[String]) -> CliResult<Vec<LabelId>> {
    let mut labels = Vec::with_capacity(args.len());
    for arg in args {
        let label = arg
            .parse::<LabelId>()
            .map_err(|e| format!("invalid label '{}': {}", arg, e))?;
        labels.push(label);
    }
    Ok(labels)
}
