//! Error types for the watch crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or running a watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A configured watch root does not exist
    #[error("watch root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Nothing to watch was configured
    #[error("no files, directories, or missing paths configured")]
    EmptyWatchSet,

    /// Errors from the underlying OS watch mechanism
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = WatchError> = std::result::Result<T, E>;
