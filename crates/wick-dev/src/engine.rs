//! The seam to the external build engine.
//!
//! The bundler/compiler is an external collaborator; the coordinator
//! only ever sees it through [`BuildEngine`]. Lifecycle events flow
//! back over the channel registered with [`BuildEngine::watch`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// One compile error or warning, shaped for client rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(message: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }
}

/// Build lifecycle events the engine reports while watching.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A recompile began; output is stale until it finishes.
    BuildStarted,
    /// A recompile settled. Errors and warnings are data, not failures.
    BuildFinished {
        duration_ms: u64,
        errors: Vec<Diagnostic>,
        warnings: Vec<Diagnostic>,
    },
}

/// Callbacks handed to the engine when watch-mode starts.
pub struct EngineHooks {
    /// Lifecycle events land here; the coordinator pumps them out to
    /// connected clients.
    pub events: mpsc::Sender<EngineEvent>,
}

/// External bundler/compiler handle.
///
/// Implementations wrap whatever build tool the application framework
/// sits on; the coordinator imposes no queuing contract on
/// `invalidate` beyond what the engine itself provides.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Begin watch-mode compilation, reporting lifecycle events
    /// through the hooks. Called once by the coordinator.
    fn watch(&self, hooks: EngineHooks);

    /// Request that outputs be recomputed. Resolves once the engine
    /// reports the recompute has started or settled; concurrent calls
    /// are tolerated.
    async fn invalidate(&self) -> Result<()>;
}
