//! Dev server configuration.

use crate::error::{DevError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Route the HMR upgrade handshake is mounted on.
pub const DEFAULT_HMR_PATH: &str = "/__wick_hmr__";
/// Route serving the embedded hot-client script.
pub const DEFAULT_CLIENT_SCRIPT_PATH: &str = "/__wick_client__.js";
/// Route of the launch-editor diagnostic endpoint.
pub const DEFAULT_LAUNCH_EDITOR_PATH: &str = "/__wick_launch_editor__";

/// Configuration for the dev server surface.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Server socket address (IP + port).
    pub addr: SocketAddr,

    /// Directory the build engine writes its outputs to; served as the
    /// fallback route.
    pub out_dir: PathBuf,

    /// Editor command for the launch-editor endpoint. `None` falls
    /// back to the `EDITOR` environment variable.
    pub editor_command: Option<String>,

    /// Mount point of the HMR upgrade route.
    pub hmr_path: String,

    /// Mount point of the hot-client script.
    pub client_script_path: String,

    /// Mount point of the launch-editor endpoint.
    pub launch_editor_path: String,
}

impl DevConfig {
    pub fn new(addr: SocketAddr, out_dir: PathBuf) -> Self {
        Self {
            addr,
            out_dir,
            editor_command: None,
            hmr_path: DEFAULT_HMR_PATH.to_string(),
            client_script_path: DEFAULT_CLIENT_SCRIPT_PATH.to_string(),
            launch_editor_path: DEFAULT_LAUNCH_EDITOR_PATH.to_string(),
        }
    }

    /// Like [`DevConfig::new`] but probes for a free port, starting at
    /// the requested one and trying the next ten.
    pub fn with_available_port(port: u16, out_dir: PathBuf) -> Result<Self> {
        Ok(Self::new(find_available_port(port)?, out_dir))
    }

    /// The server URL as a string.
    pub fn server_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Try the requested port first, then incrementally search for the
/// next available one (up to +10 from the original).
fn find_available_port(requested_port: u16) -> Result<SocketAddr> {
    use std::net::TcpListener;

    let addr = SocketAddr::from(([127, 0, 0, 1], requested_port));
    if TcpListener::bind(addr).is_ok() {
        return Ok(addr);
    }

    for offset in 1..=10 {
        let port = requested_port.saturating_add(offset);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        if TcpListener::bind(addr).is_ok() {
            tracing::warn!(
                requested = requested_port,
                using = port,
                "requested port is busy"
            );
            return Ok(addr);
        }
    }

    Err(DevError::Server(format!(
        "ports {}-{} are all in use",
        requested_port,
        requested_port.saturating_add(10)
    )))
}
