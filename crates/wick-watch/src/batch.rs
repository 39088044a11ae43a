//! Event values delivered to watch consumers.

use crate::snapshot::Snapshot;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// What kind of filesystem activity a raw event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File content (or metadata) was rewritten in place.
    Content,
    /// A path appeared, or was renamed into or within a watched root.
    Rename,
    /// A path disappeared.
    Removed,
}

/// One undebounced filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    /// Modification time in milliseconds since the Unix epoch; for
    /// removals this is the observation time.
    pub mtime_ms: u64,
    pub kind: ChangeKind,
}

/// One debounce window's worth of changes, folded into sets.
///
/// Created once per window and consumed exactly once. The path sets are
/// the union of every raw event that fell into the window; duplicates
/// and event ordering are not preserved.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    changes: BTreeSet<PathBuf>,
    removals: BTreeSet<PathBuf>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl ChangeBatch {
    pub(crate) fn new(
        changes: BTreeSet<PathBuf>,
        removals: BTreeSet<PathBuf>,
        snapshot: Arc<RwLock<Snapshot>>,
    ) -> Self {
        Self {
            changes,
            removals,
            snapshot,
        }
    }

    /// Paths that changed or appeared during the window.
    pub fn changes(&self) -> &BTreeSet<PathBuf> {
        &self.changes
    }

    /// Paths that disappeared during the window.
    pub fn removals(&self) -> &BTreeSet<PathBuf> {
        &self.removals
    }

    pub(crate) fn into_parts(self) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
        (self.changes, self.removals)
    }

    /// All currently confirmed files.
    ///
    /// Computed lazily at call time, not at event time, so callers
    /// always see the post-debounce view even if they hold on to the
    /// batch for a while.
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.snapshot.read().confirmed_files()
    }
}
