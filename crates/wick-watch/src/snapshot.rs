//! The confirmed-file snapshot exposed to batch consumers.
//!
//! A [`Snapshot`] maps every path the watch has learned about to its
//! last-known metadata. Only entries whose accuracy is confirmed count
//! as "known files"; missing or pending paths stay in the map so the
//! aggregator can notice when they appear, but they are never exposed
//! through [`Snapshot::confirmed_files`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// How trustworthy a [`TimeEntry`] is.
///
/// Presence is what matters: an entry without an accuracy is a pending
/// or missing path, not a confirmed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// The entry was produced by a successful stat of a real file.
    Exact,
}

/// Last-known metadata for one watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeEntry {
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime_ms: u64,
    /// Confirmation marker; `None` means the path is pending/missing.
    pub accuracy: Option<Accuracy>,
}

impl TimeEntry {
    /// Entry for a confirmed, existing file.
    pub fn confirmed(mtime_ms: u64) -> Self {
        Self {
            mtime_ms,
            accuracy: Some(Accuracy::Exact),
        }
    }

    /// Entry for a path being watched for appearance.
    pub fn pending() -> Self {
        Self {
            mtime_ms: 0,
            accuracy: None,
        }
    }

    /// Whether this entry counts as a known file.
    pub fn is_confirmed(&self) -> bool {
        self.accuracy.is_some()
    }
}

/// The set of currently known watched paths with their metadata.
///
/// Owned exclusively by the aggregator; consumers only ever see the
/// read-only views produced by [`Snapshot::confirmed_files`] and
/// [`Snapshot::confirmed_set`]. The aggregator replaces entries as
/// events arrive but hands out a consistent view only after each
/// aggregation cycle completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, TimeEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metadata for a path, replacing any previous entry.
    pub fn insert(&mut self, path: PathBuf, entry: TimeEntry) {
        self.entries.insert(path, entry);
    }

    /// Forget a path entirely.
    pub fn remove(&mut self, path: &Path) -> Option<TimeEntry> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&TimeEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All confirmed files, in path order.
    pub fn confirmed_files(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_confirmed())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// The confirmed files as a set, used for suppression comparisons.
    pub fn confirmed_set(&self) -> BTreeSet<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_confirmed())
            .map(|(path, _)| path.clone())
            .collect()
    }
}
