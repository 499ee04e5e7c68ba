//! Utility functions and helpers
//!
//! Timestamp helpers and crash-safe file writes.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write_with, cleanup_temp_files, sync_dir};
pub use time::current_timestamp_ms;
