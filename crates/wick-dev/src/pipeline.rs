//! The full development loop: file changes in, client reloads out.

use crate::coordinator::ReloadCoordinator;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wick_watch::{ChangeBatch, FileWatcher, WatchOptions};

/// Wires a [`FileWatcher`] to a [`ReloadCoordinator`].
///
/// Aggregated change batches trigger `invalidate` on the engine; the
/// coordinator's event pump takes care of pushing build results to
/// connected clients.
pub struct ReloadPipeline {
    watcher: FileWatcher,
    batches: mpsc::Receiver<ChangeBatch>,
    coordinator: Arc<ReloadCoordinator>,
    cancel: CancellationToken,
}

impl ReloadPipeline {
    /// Start watching and hook up the coordinator.
    ///
    /// # Errors
    ///
    /// Fails when the watch cannot be established (missing roots,
    /// OS watch registration failure).
    pub fn new(options: WatchOptions, coordinator: Arc<ReloadCoordinator>) -> Result<Self> {
        let (watcher, batches) = FileWatcher::watch(options)?;
        Ok(Self {
            watcher,
            batches,
            coordinator,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops [`ReloadPipeline::run`] when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled or the watch closes. Teardown stops the
    /// underlying watch.
    pub async fn run(mut self) -> Result<()> {
        self.coordinator.start();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                batch = self.batches.recv() => match batch {
                    Some(batch) => {
                        for path in batch.changes() {
                            tracing::info!(path = %path.display(), "file changed");
                        }
                        for path in batch.removals() {
                            tracing::info!(path = %path.display(), "file removed");
                        }

                        if let Err(err) = self.coordinator.invalidate().await {
                            // Engine failures surface to clients as
                            // diagnostics; the loop keeps running.
                            tracing::warn!("rebuild request failed: {}", err);
                            self.coordinator.send(
                                "errors",
                                Some(serde_json::json!([{ "message": err.to_string() }])),
                            );
                        }
                    }
                    None => break,
                },
            }
        }

        self.watcher.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BuildEngine, EngineEvent, EngineHooks};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingEngine {
        hooks: Mutex<Option<tokio::sync::mpsc::Sender<EngineEvent>>>,
        builds: AtomicUsize,
    }

    impl CountingEngine {
        fn new() -> Self {
            Self {
                hooks: Mutex::new(None),
                builds: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BuildEngine for CountingEngine {
        fn watch(&self, hooks: EngineHooks) {
            *self.hooks.lock() = Some(hooks.events);
        }

        async fn invalidate(&self) -> crate::error::Result<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let hooks = self.hooks.lock().clone();
            if let Some(tx) = hooks {
                let _ = tx.send(EngineEvent::BuildStarted).await;
                let _ = tx
                    .send(EngineEvent::BuildFinished {
                        duration_ms: 1,
                        errors: Vec::new(),
                        warnings: Vec::new(),
                    })
                    .await;
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_change_triggers_a_rebuild() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("entry.js");
        fs::write(&file, "export {}").unwrap();

        let engine = Arc::new(CountingEngine::new());
        let coordinator = Arc::new(ReloadCoordinator::new(engine.clone()));

        let options = WatchOptions {
            files: vec![file.clone()],
            aggregate_timeout: Duration::from_millis(100),
            ..WatchOptions::default()
        };
        let pipeline = ReloadPipeline::new(options, coordinator.clone()).unwrap();
        let cancel = pipeline.cancellation_token();
        let task = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&file, "export default 1").unwrap();

        // The aggregated batch lands, the engine rebuilds, and the
        // coordinator settles into a valid state.
        tokio::time::timeout(Duration::from_secs(5), coordinator.wait_until_valid(false))
            .await
            .expect("pipeline produced a valid build")
            .unwrap();
        assert!(engine.builds.load(Ordering::SeqCst) >= 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pipeline shut down")
            .unwrap()
            .unwrap();
    }
}
