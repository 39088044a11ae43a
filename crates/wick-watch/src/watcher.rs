//! Watch setup over the OS file-watching mechanism.
//!
//! [`FileWatcher::watch`] registers the configured files, directories,
//! and not-yet-existing paths with a notify watcher, seeds the initial
//! snapshot, and spawns the aggregation task. Events for paths outside
//! every watched root are filtered before they reach the aggregator.

use crate::aggregator::Aggregator;
use crate::batch::{ChangeBatch, ChangeKind, RawChange};
use crate::error::{Result, WatchError};
use crate::snapshot::{Snapshot, TimeEntry};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default quiet period before a window of events is emitted.
pub const DEFAULT_AGGREGATE_TIMEOUT: Duration = Duration::from_millis(300);

/// Configuration for one watch.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Individual files to watch.
    pub files: Vec<PathBuf>,
    /// Directories to watch recursively.
    pub directories: Vec<PathBuf>,
    /// Paths that do not exist yet but should be reported once created.
    pub missing: Vec<PathBuf>,
    /// Debounce duration for the aggregated channel.
    pub aggregate_timeout: Duration,
    /// Events older than this are ignored; defaults to watch activation.
    pub start_time: Option<SystemTime>,
    /// Suppress notifications when only file content changed but the
    /// set of known files did not.
    pub ignore_content_updates: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            directories: Vec::new(),
            missing: Vec::new(),
            aggregate_timeout: DEFAULT_AGGREGATE_TIMEOUT,
            start_time: None,
            ignore_content_updates: false,
        }
    }
}

/// Cloneable disposer for a running watch.
///
/// [`WatchHandle::close`] stops the OS watcher, cancels any pending
/// debounce timer, and releases the retained snapshot state. It is
/// idempotent: every call after the first is a no-op.
#[derive(Clone)]
pub struct WatchHandle {
    cancel: CancellationToken,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
}

impl WatchHandle {
    pub fn close(&self) {
        // Dropping the notify watcher unregisters the OS-level handles.
        drop(self.watcher.lock().take());
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A running watch.
///
/// Returned by [`FileWatcher::watch`] together with the debounced batch
/// channel. Dropping the watcher closes it.
pub struct FileWatcher {
    handle: WatchHandle,
    raw: Option<mpsc::Receiver<RawChange>>,
}

impl FileWatcher {
    /// Begin monitoring the configured paths.
    ///
    /// Must be called from within a tokio runtime; the aggregation task
    /// is spawned onto it. Returns the watch plus the debounced batch
    /// channel, which delivers at most one [`ChangeBatch`] per quiet
    /// period.
    ///
    /// # Errors
    ///
    /// Fails immediately when nothing is configured to watch, when a
    /// directory root does not exist, or when the OS watch registration
    /// fails.
    pub fn watch(options: WatchOptions) -> Result<(Self, mpsc::Receiver<ChangeBatch>)> {
        if options.files.is_empty() && options.directories.is_empty() && options.missing.is_empty()
        {
            return Err(WatchError::EmptyWatchSet);
        }
        for dir in &options.directories {
            if !dir.is_dir() {
                return Err(WatchError::RootNotFound(dir.clone()));
            }
        }

        let start_time_ms = options
            .start_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        // Files that do not exist yet are watched for appearance, the
        // same way explicitly missing paths are.
        let mut present_files = Vec::new();
        let mut missing = options.missing.clone();
        for file in &options.files {
            if file.is_file() {
                present_files.push(file.clone());
            } else {
                missing.push(file.clone());
            }
        }

        let mut initial = seed_snapshot(&present_files, &missing);
        seed_directories(&mut initial, &options.directories);
        let snapshot = Arc::new(RwLock::new(initial));

        let (event_tx, event_rx) = mpsc::channel::<RawChange>(512);
        let (batch_tx, batch_rx) = mpsc::channel::<ChangeBatch>(64);
        let (raw_tx, raw_rx) = mpsc::channel::<RawChange>(256);

        let file_set: BTreeSet<PathBuf> = options.files.iter().cloned().collect();
        let missing_set: BTreeSet<PathBuf> = missing.iter().cloned().collect();
        let dir_roots = options.directories.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!("watch event error: {}", err);
                    return;
                }
            };

            let kind = match classify(&event.kind) {
                Some(kind) => kind,
                None => return,
            };

            for path in &event.paths {
                if !is_watched(path, &file_set, &dir_roots, &missing_set) {
                    continue;
                }
                if let Some(raw) = observe(path.clone(), kind) {
                    // Fails only once the aggregation task is gone.
                    let _ = event_tx.blocking_send(raw);
                }
            }
        })?;

        for file in &present_files {
            watcher.watch(file, RecursiveMode::NonRecursive)?;
        }
        for dir in &options.directories {
            watcher.watch(dir, RecursiveMode::Recursive)?;
        }
        for path in &missing {
            // Watch the nearest existing ancestor recursively so the
            // path is seen even when intermediate directories have to
            // be created first. Unrelated activity under the ancestor
            // is dropped by `is_watched`.
            if let Some(root) = nearest_existing_ancestor(path) {
                watcher.watch(&root, RecursiveMode::Recursive)?;
            }
        }

        tracing::info!(
            files = options.files.len(),
            directories = options.directories.len(),
            missing = missing.len(),
            "watch started"
        );

        let cancel = CancellationToken::new();
        let aggregator = Aggregator::new(
            Arc::clone(&snapshot),
            options.aggregate_timeout,
            options.ignore_content_updates,
            start_time_ms,
            batch_tx,
            raw_tx,
        );
        tokio::spawn(aggregator.run(event_rx, cancel.clone()));

        let handle = WatchHandle {
            cancel,
            watcher: Arc::new(Mutex::new(Some(watcher))),
        };

        Ok((
            Self {
                handle,
                raw: Some(raw_rx),
            },
            batch_rx,
        ))
    }

    /// Take the undebounced event channel. Yields `None` after the
    /// first call; the channel can have only one consumer.
    pub fn raw_changes(&mut self) -> Option<mpsc::Receiver<RawChange>> {
        self.raw.take()
    }

    /// A cloneable disposer for this watch.
    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    /// Stop the watch. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a notify event kind onto the closed change vocabulary.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Modify(_) => Some(ChangeKind::Content),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Turn an event into a raw change by consulting the filesystem.
///
/// A change or rename whose path no longer stats is a removal that
/// raced the event delivery. Directory events carry no payload of
/// their own; their children arrive as separate events.
fn observe(path: PathBuf, kind: ChangeKind) -> Option<RawChange> {
    if kind == ChangeKind::Removed {
        return Some(RawChange {
            path,
            mtime_ms: now_ms(),
            kind,
        });
    }
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Some(RawChange {
            mtime_ms: mtime_ms(&meta),
            path,
            kind,
        }),
        Ok(_) => None,
        Err(_) => Some(RawChange {
            path,
            mtime_ms: now_ms(),
            kind: ChangeKind::Removed,
        }),
    }
}

/// Whether a reported path belongs to any configured watch root.
///
/// Watching the parent directory of a missing path makes notify report
/// sibling activity too; everything that is not an exact file/missing
/// match or under a directory root is dropped here.
fn is_watched(
    path: &Path,
    files: &BTreeSet<PathBuf>,
    directories: &[PathBuf],
    missing: &BTreeSet<PathBuf>,
) -> bool {
    if files.contains(path) || missing.contains(path) {
        return true;
    }
    directories.iter().any(|dir| path.starts_with(dir))
}

/// Initial snapshot: confirmed entries for present files and the
/// contents of directory roots, pending entries for missing paths.
fn seed_snapshot(present_files: &[PathBuf], missing: &[PathBuf]) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for file in present_files {
        match std::fs::metadata(file) {
            Ok(meta) => snapshot.insert(file.clone(), TimeEntry::confirmed(mtime_ms(&meta))),
            Err(_) => snapshot.insert(file.clone(), TimeEntry::pending()),
        }
    }
    for path in missing {
        snapshot.insert(path.clone(), TimeEntry::pending());
    }
    snapshot
}

/// Walk directory roots once at startup so `all_files` is meaningful
/// before the first event arrives. Unreadable entries are skipped.
fn seed_directories(snapshot: &mut Snapshot, directories: &[PathBuf]) {
    for dir in directories {
        for entry in walkdir::WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                snapshot.insert(entry.into_path(), TimeEntry::confirmed(mtime_ms(&meta)));
            }
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| candidate.is_dir())
        .map(Path::to_path_buf)
}

fn mtime_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(now_ms)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
