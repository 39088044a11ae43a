//! The reload coordinator: bridges build-engine lifecycle events to
//! connected clients and lets callers force or await rebuilds.

use crate::engine::{BuildEngine, EngineEvent, EngineHooks};
use crate::error::Result;
use crate::protocol::HotMessage;
use crate::state::DevState;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ReloadCoordinator {
    engine: Arc<dyn BuildEngine>,
    state: Arc<DevState>,
}

impl ReloadCoordinator {
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(DevState::new()),
        }
    }

    pub fn state(&self) -> Arc<DevState> {
        Arc::clone(&self.state)
    }

    /// Register the engine hooks and spawn the event pump.
    ///
    /// The pump marks output stale when a build starts; when a build
    /// settles it marks the output valid, forwards compile errors and
    /// warnings to clients as `errors` / `warns` messages, and pushes
    /// `built` so clients reload. Engine failures are data on the hot
    /// channel, never panics or thrown errors.
    pub fn start(&self) {
        let (events_tx, events_rx) = mpsc::channel(16);
        self.engine.watch(EngineHooks { events: events_tx });

        let state = Arc::clone(&self.state);
        tokio::spawn(pump(state, events_rx));
    }

    /// Request that the engine recompute outputs; resolves when the
    /// engine reports the recompute has settled.
    pub async fn invalidate(&self) -> Result<()> {
        self.state.mark_invalid();
        self.engine.invalidate().await
    }

    /// Resolve once the current build output is valid.
    ///
    /// With `force`, the current state is marked stale first and a
    /// rebuild is triggered even if the engine believes it is valid,
    /// guaranteeing one fresh cycle before resolution.
    pub async fn wait_until_valid(&self, force: bool) -> Result<()> {
        if force {
            self.invalidate().await?;
        }
        self.state.wait_valid().await;
        Ok(())
    }

    /// Publish a named action to all connected clients, best effort.
    pub fn send(&self, action: &str, payload: Option<Value>) {
        let message = HotMessage::new(action, payload);
        self.state.broadcast(&message.to_json());
    }
}

/// Consume engine lifecycle events for the life of the watch.
async fn pump(state: Arc<DevState>, mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::BuildStarted => {
                state.mark_invalid();
                state.broadcast(&HotMessage::new("building", None).to_json());
            }
            EngineEvent::BuildFinished {
                duration_ms,
                errors,
                warnings,
            } => {
                if !errors.is_empty() {
                    tracing::warn!(count = errors.len(), "build finished with errors");
                    let data = serde_json::to_value(&errors).ok();
                    state.broadcast(&HotMessage::new("errors", data).to_json());
                }
                if !warnings.is_empty() {
                    let data = serde_json::to_value(&warnings).ok();
                    state.broadcast(&HotMessage::new("warns", data).to_json());
                }

                // The compile has settled either way; waiting callers
                // and clients decide what to do with the diagnostics.
                state.mark_valid();
                state.broadcast(
                    &HotMessage::new("built", Some(serde_json::json!({ "duration_ms": duration_ms })))
                        .to_json(),
                );
                tracing::info!(duration_ms, "build settled");
            }
        }
    }
    tracing::debug!("engine event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Diagnostic;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Engine double: every `invalidate` runs one synthetic build
    /// cycle through the registered hooks.
    struct MockEngine {
        hooks: Mutex<Option<mpsc::Sender<EngineEvent>>>,
        builds: AtomicUsize,
        errors: Mutex<Vec<Diagnostic>>,
    }

    impl MockEngine {
        fn new() -> Self {
            Self {
                hooks: Mutex::new(None),
                builds: AtomicUsize::new(0),
                errors: Mutex::new(Vec::new()),
            }
        }

        fn with_errors(errors: Vec<Diagnostic>) -> Self {
            let engine = Self::new();
            *engine.errors.lock() = errors;
            engine
        }

        fn build_count(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BuildEngine for MockEngine {
        fn watch(&self, hooks: EngineHooks) {
            *self.hooks.lock() = Some(hooks.events);
        }

        async fn invalidate(&self) -> Result<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let tx = self.hooks.lock().clone().expect("watch registered");
            tx.send(EngineEvent::BuildStarted).await.unwrap();
            let errors = self.errors.lock().clone();
            tx.send(EngineEvent::BuildFinished {
                duration_ms: 5,
                errors,
                warnings: Vec::new(),
            })
            .await
            .unwrap();
            Ok(())
        }
    }

    fn coordinator_with(engine: Arc<MockEngine>) -> ReloadCoordinator {
        let coordinator = ReloadCoordinator::new(engine);
        coordinator.start();
        coordinator
    }

    #[tokio::test]
    async fn invalidate_runs_a_build_cycle() {
        let engine = Arc::new(MockEngine::new());
        let coordinator = coordinator_with(engine.clone());

        coordinator.invalidate().await.unwrap();
        coordinator.wait_until_valid(false).await.unwrap();

        assert_eq!(engine.build_count(), 1);
        assert!(coordinator.state().is_valid());
    }

    #[tokio::test]
    async fn forced_wait_triggers_an_extra_rebuild_while_valid() {
        let engine = Arc::new(MockEngine::new());
        let coordinator = coordinator_with(engine.clone());

        coordinator.invalidate().await.unwrap();
        coordinator.wait_until_valid(false).await.unwrap();
        assert_eq!(engine.build_count(), 1);

        // The engine believes state is valid; force must still rebuild.
        coordinator.wait_until_valid(true).await.unwrap();
        assert_eq!(engine.build_count(), 2);
        assert!(coordinator.state().is_valid());
    }

    #[tokio::test]
    async fn unforced_wait_does_not_rebuild_when_valid() {
        let engine = Arc::new(MockEngine::new());
        let coordinator = coordinator_with(engine.clone());

        coordinator.invalidate().await.unwrap();
        coordinator.wait_until_valid(false).await.unwrap();
        coordinator.wait_until_valid(false).await.unwrap();

        assert_eq!(engine.build_count(), 1);
    }

    #[tokio::test]
    async fn compile_errors_are_forwarded_not_thrown() {
        let engine = Arc::new(MockEngine::with_errors(vec![Diagnostic::new("x")]));
        let coordinator = coordinator_with(engine);

        let (_id, mut rx) = coordinator.state().register_client();

        coordinator.invalidate().await.unwrap();
        coordinator.wait_until_valid(false).await.unwrap();

        let mut actions = Vec::new();
        while let Ok(Some(raw)) =
            tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
        {
            let msg: HotMessage = serde_json::from_str(&raw).unwrap();
            actions.push(msg.action);
        }

        assert!(actions.contains(&"building".to_string()));
        assert!(actions.contains(&"errors".to_string()));
        assert!(actions.contains(&"built".to_string()));
    }

    #[tokio::test]
    async fn send_with_zero_clients_does_not_error() {
        let engine = Arc::new(MockEngine::new());
        let coordinator = coordinator_with(engine);

        coordinator.send("errors", Some(serde_json::json!([{"message": "x"}])));
        coordinator.send("reload", None);
    }

    #[tokio::test]
    async fn send_reaches_connected_clients() {
        let engine = Arc::new(MockEngine::new());
        let coordinator = coordinator_with(engine);

        let (_id, mut rx) = coordinator.state().register_client();
        coordinator.send("reload", None);

        let raw = rx.recv().await.unwrap();
        assert_eq!(raw, r#"{"action":"reload"}"#);
    }
}
