//! File-change aggregation for the wick development loop.
//!
//! This crate turns the raw per-path event stream of an OS file watcher
//! into a throttled stream of batched notifications suitable for driving
//! rebuilds. It provides:
//!
//! - [`FileWatcher`] - watch files, directories, and not-yet-existing
//!   paths with a single call
//! - Debounced [`ChangeBatch`] delivery - at most one batch per quiet
//!   period, folding duplicate events into sets
//! - An undebounced [`RawChange`] channel for low-latency diagnostics
//! - Optional suppression of content-only updates that leave the set of
//!   known files unchanged
//!
//! # Example
//!
//! ```rust,no_run
//! use wick_watch::{FileWatcher, WatchOptions};
//!
//! # async fn example() -> Result<(), wick_watch::WatchError> {
//! let options = WatchOptions {
//!     directories: vec!["src".into()],
//!     ..WatchOptions::default()
//! };
//!
//! let (watcher, mut batches) = FileWatcher::watch(options)?;
//!
//! while let Some(batch) = batches.recv().await {
//!     for path in batch.changes() {
//!         println!("changed: {}", path.display());
//!     }
//! }
//!
//! watcher.close();
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod batch;
mod error;
mod snapshot;
mod watcher;

pub use batch::{ChangeBatch, ChangeKind, RawChange};
pub use error::{Result, WatchError};
pub use snapshot::{Accuracy, Snapshot, TimeEntry};
pub use watcher::{FileWatcher, WatchHandle, WatchOptions};
