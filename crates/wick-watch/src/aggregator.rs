//! The debounce state machine behind a watch.
//!
//! Raw events from the OS watcher flow into [`Aggregator::run`], which
//! folds them into per-window [`ChangeBatch`]es. The machine has two
//! states: idle (no pending batch) and pending (events accumulating,
//! timer armed). Any raw event while pending pushes the deadline to
//! `now + aggregate_timeout`; expiry emits one batch and returns to
//! idle. When the batch channel is full the window stays pending and
//! delivery is retried after another quiet period, so a slow consumer
//! delays batches but never loses them.

use crate::batch::{ChangeBatch, ChangeKind, RawChange};
use crate::snapshot::{Snapshot, TimeEntry};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct Aggregator {
    snapshot: Arc<RwLock<Snapshot>>,
    pending_changes: BTreeSet<PathBuf>,
    pending_removals: BTreeSet<PathBuf>,
    /// Confirmed-path set as of the last emitted batch. `None` until
    /// the first window fires; the first window always emits so the
    /// baseline exists for later comparisons.
    last_emitted: Option<BTreeSet<PathBuf>>,
    aggregate_timeout: Duration,
    ignore_content_updates: bool,
    /// Events with an mtime older than this are stale replays from
    /// before the watch was activated and are discarded.
    start_time_ms: u64,
    batch_tx: mpsc::Sender<ChangeBatch>,
    raw_tx: mpsc::Sender<RawChange>,
}

impl Aggregator {
    pub(crate) fn new(
        snapshot: Arc<RwLock<Snapshot>>,
        aggregate_timeout: Duration,
        ignore_content_updates: bool,
        start_time_ms: u64,
        batch_tx: mpsc::Sender<ChangeBatch>,
        raw_tx: mpsc::Sender<RawChange>,
    ) -> Self {
        Self {
            snapshot,
            pending_changes: BTreeSet::new(),
            pending_removals: BTreeSet::new(),
            last_emitted: None,
            aggregate_timeout,
            ignore_content_updates,
            start_time_ms,
            batch_tx,
            raw_tx,
        }
    }

    /// Drive the state machine until the event source closes or the
    /// token is cancelled. Cancellation also drops any pending window.
    pub(crate) async fn run(mut self, mut raw_rx: mpsc::Receiver<RawChange>, cancel: CancellationToken) {
        let mut deadline: Option<Instant> = None;

        loop {
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,

                event = raw_rx.recv() => match event {
                    Some(raw) => {
                        if self.accept(raw) {
                            deadline = Some(Instant::now() + self.aggregate_timeout);
                        }
                    }
                    None => break,
                },

                _ = timer => {
                    deadline = if self.flush() {
                        None
                    } else {
                        Some(Instant::now() + self.aggregate_timeout)
                    };
                }
            }
        }
    }

    /// Fold one raw event into the pending window.
    ///
    /// Returns true when the event was accepted and the debounce timer
    /// should be (re-)armed.
    pub(crate) fn accept(&mut self, raw: RawChange) -> bool {
        if raw.kind != ChangeKind::Removed && raw.mtime_ms < self.start_time_ms {
            tracing::trace!(path = %raw.path.display(), "discarding stale event");
            return false;
        }

        let alters_set = self.apply_to_snapshot(&raw);

        match raw.kind {
            ChangeKind::Content | ChangeKind::Rename => {
                self.pending_removals.remove(&raw.path);
                self.pending_changes.insert(raw.path.clone());
            }
            ChangeKind::Removed => {
                self.pending_changes.remove(&raw.path);
                self.pending_removals.insert(raw.path.clone());
            }
        }

        // The undebounced channel bypasses the window, but under
        // suppression it must also skip content-only events that leave
        // the confirmed-file set unchanged.
        let skip_raw =
            self.ignore_content_updates && raw.kind == ChangeKind::Content && !alters_set;
        if !skip_raw {
            if let Err(err) = self.raw_tx.try_send(raw) {
                tracing::trace!("raw change not delivered: {}", err);
            }
        }

        true
    }

    /// Update the snapshot for one event. Returns whether the set of
    /// confirmed files changed.
    fn apply_to_snapshot(&mut self, raw: &RawChange) -> bool {
        let mut snapshot = self.snapshot.write();
        match raw.kind {
            ChangeKind::Content | ChangeKind::Rename => {
                let was_confirmed = snapshot
                    .get(&raw.path)
                    .is_some_and(TimeEntry::is_confirmed);
                snapshot.insert(raw.path.clone(), TimeEntry::confirmed(raw.mtime_ms));
                !was_confirmed
            }
            ChangeKind::Removed => {
                let was_confirmed = snapshot
                    .get(&raw.path)
                    .is_some_and(TimeEntry::is_confirmed);
                // Keep a pending entry so a reappearance is noticed.
                snapshot.insert(raw.path.clone(), TimeEntry::pending());
                was_confirmed
            }
        }
    }

    /// Close the current window: emit the accumulated batch unless
    /// suppression applies.
    ///
    /// Returns false when the consumer has fallen behind and the window
    /// was folded back into the pending state; the caller re-arms the
    /// timer so delivery is retried rather than lost.
    pub(crate) fn flush(&mut self) -> bool {
        let changes = std::mem::take(&mut self.pending_changes);
        let removals = std::mem::take(&mut self.pending_removals);

        let current = self.snapshot.read().confirmed_set();

        if self.ignore_content_updates {
            if let Some(baseline) = &self.last_emitted {
                if *baseline == current {
                    tracing::debug!(
                        changed = changes.len(),
                        removed = removals.len(),
                        "suppressing batch, known files unchanged"
                    );
                    return true;
                }
            }
        }

        let batch = ChangeBatch::new(changes, removals, Arc::clone(&self.snapshot));
        match self.batch_tx.try_send(batch) {
            Ok(()) => {
                // The baseline advances only when a batch is delivered.
                self.last_emitted = Some(current);
                true
            }
            Err(mpsc::error::TrySendError::Full(batch)) => {
                tracing::debug!("batch channel full, deferring window");
                let (changes, removals) = batch.into_parts();
                self.pending_changes.extend(changes);
                self.pending_removals.extend(removals);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("batch consumer gone, dropping window");
                true
            }
        }
    }
}
