//! Error types for the dev crate.

use thiserror::Error;

/// Errors raised by the reload coordinator and dev server surface.
#[derive(Debug, Error)]
pub enum DevError {
    /// The build engine rejected or failed a request
    #[error("build engine error: {0}")]
    Engine(String),

    /// Dev server startup or runtime errors
    #[error("server error: {0}")]
    Server(String),

    /// Errors from the file watch layer
    #[error("watch error: {0}")]
    Watch(#[from] wick_watch::WatchError),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = DevError> = std::result::Result<T, E>;
