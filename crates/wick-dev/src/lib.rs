//! Dev-server reload coordination for the wick development loop.
//!
//! This crate bridges an external build engine to browser clients that
//! expect hot updates:
//!
//! - [`BuildEngine`] - the narrow seam to the bundler/compiler
//! - [`ReloadCoordinator`] - `invalidate`, `wait_until_valid`, `send`,
//!   and the HMR upgrade handler
//! - [`DevServer`] - mounts the dev surface (HMR channel, hot client
//!   script, bundler-output serving, launch-editor endpoint) on an
//!   axum router
//! - [`ReloadPipeline`] - wires a [`wick_watch::FileWatcher`] to the
//!   coordinator for the full watch -> rebuild -> notify loop
//!
//! Compile errors and warnings are never thrown at callers; they are
//! forwarded to connected clients as `errors` / `warns` messages so the
//! browser can render them without crashing the coordinator.

mod config;
mod coordinator;
mod engine;
mod error;
mod pipeline;
mod protocol;
mod server;
mod state;

pub use config::DevConfig;
pub use coordinator::ReloadCoordinator;
pub use engine::{BuildEngine, Diagnostic, EngineEvent, EngineHooks};
pub use error::{DevError, Result};
pub use pipeline::ReloadPipeline;
pub use protocol::HotMessage;
pub use server::DevServer;
pub use state::DevState;
