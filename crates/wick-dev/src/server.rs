//! The HTTP surface of the dev server.
//!
//! [`DevServer::apply`] mounts the hot-reload upgrade route, the
//! embedded client script, bundler-output serving, and the
//! launch-editor diagnostic endpoint onto an axum router. CORS is wide
//! open, which is standard for a local development server.

use crate::config::DevConfig;
use crate::coordinator::ReloadCoordinator;
use crate::error::{DevError, Result};
use crate::protocol::HotMessage;
use crate::state::DevState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::path::{Component, Path};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const HOT_CLIENT_SCRIPT: &str = include_str!("../assets/hot-client.js");

struct ServerContext {
    coordinator: Arc<ReloadCoordinator>,
    config: DevConfig,
}

/// Development server surface.
pub struct DevServer {
    config: DevConfig,
    coordinator: Arc<ReloadCoordinator>,
}

impl DevServer {
    pub fn new(config: DevConfig, coordinator: Arc<ReloadCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Mount the dev surface on a router.
    ///
    /// Routes added: the HMR upgrade handshake, the hot-client script,
    /// the launch-editor endpoint, and a fallback serving build
    /// outputs from the configured output directory.
    pub fn apply(&self, router: Router) -> Router {
        let ctx = Arc::new(ServerContext {
            coordinator: Arc::clone(&self.coordinator),
            config: self.config.clone(),
        });

        let dev_routes = Router::new()
            .route(&self.config.hmr_path, get(handle_hmr))
            .route(&self.config.client_script_path, get(handle_client_script))
            .route(&self.config.launch_editor_path, get(handle_launch_editor))
            .fallback(get(handle_output))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(ctx);

        router.merge(dev_routes)
    }

    /// Bind and serve until the task is dropped or the listener fails.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.addr;
        let app = self.apply(Router::new());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| DevError::Server(format!("failed to bind {addr}: {err}")))?;

        tracing::info!(%addr, "dev server listening");

        axum::serve(listener, app)
            .await
            .map_err(|err| DevError::Server(err.to_string()))?;
        Ok(())
    }
}

impl ReloadCoordinator {
    /// Upgrade an incoming handshake into a persistent hot-reload
    /// client channel. The raw socket is handed off exactly once; the
    /// client is registered for future [`ReloadCoordinator::send`]
    /// broadcasts and removed implicitly on disconnect.
    pub fn on_hmr(&self, ws: WebSocketUpgrade) -> Response {
        let state = self.state();
        ws.on_upgrade(move |socket| client_session(state, socket))
    }
}

async fn handle_hmr(State(ctx): State<Arc<ServerContext>>, ws: WebSocketUpgrade) -> Response {
    ctx.coordinator.on_hmr(ws)
}

/// Forward queued broadcasts to one client until it disconnects.
async fn client_session(state: Arc<DevState>, mut socket: WebSocket) {
    let (id, mut queue) = state.register_client();

    // Late joiners need the current validity to render pending errors.
    let sync = HotMessage::new(
        "sync",
        Some(serde_json::json!({ "valid": state.is_valid() })),
    );
    if socket.send(Message::Text(sync.to_json().into())).await.is_err() {
        state.unregister_client(id);
        return;
    }

    loop {
        tokio::select! {
            queued = queue.recv() => match queued {
                Some(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Sender side pruned this client already.
                None => break,
            },
            inbound = socket.recv() => match inbound {
                // The channel is push-only; inbound frames are ignored.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    state.unregister_client(id);
}

async fn handle_client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        HOT_CLIENT_SCRIPT,
    )
}

#[derive(Debug, Deserialize)]
struct LaunchEditorParams {
    /// `path/to/file.tsx:12` as reported by the client error overlay.
    file: String,
}

/// Open the reported source location in the developer's editor.
///
/// Best effort: a missing editor configuration or spawn failure is a
/// diagnostic-endpoint problem, never a server crash.
async fn handle_launch_editor(
    State(ctx): State<Arc<ServerContext>>,
    Query(params): Query<LaunchEditorParams>,
) -> StatusCode {
    let command = ctx
        .config
        .editor_command
        .clone()
        .or_else(|| std::env::var("EDITOR").ok());

    let Some(command) = command else {
        tracing::warn!("launch-editor requested but no editor is configured");
        return StatusCode::NOT_FOUND;
    };

    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return StatusCode::NOT_FOUND;
    };

    match tokio::process::Command::new(program)
        .args(parts)
        .arg(&params.file)
        .spawn()
    {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(err) => {
            tracing::warn!("failed to launch editor: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Serve build outputs from the engine's output directory.
async fn handle_output(State(ctx): State<Arc<ServerContext>>, uri: Uri) -> Response {
    let rel = uri.path().trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };

    if !is_safe_relative(Path::new(rel)) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let file_path = ctx.config.out_dir.join(rel);
    match tokio::fs::read(&file_path).await {
        Ok(content) => {
            let content_type = content_type_for(rel);
            let body = if content_type.starts_with("text/html") {
                inject_client_script(&content, &ctx.config.client_script_path)
            } else {
                content
            };
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response()
        }
        Err(_) => (
            StatusCode::NOT_FOUND,
            format!("File not found: /{rel}"),
        )
            .into_response(),
    }
}

/// Reject path traversal out of the output directory.
fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

/// Add the hot-client script before `</body>`, or append when no body
/// tag exists.
fn inject_client_script(content: &[u8], script_path: &str) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script src="{script_path}"></script>"#);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str("\n  ");
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(&script_tag);
    result.into_bytes()
}

fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BuildEngine, EngineHooks};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NullEngine;

    #[async_trait]
    impl BuildEngine for NullEngine {
        fn watch(&self, _hooks: EngineHooks) {}

        async fn invalidate(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn apply_mounts_the_dev_routes() {
        let config = DevConfig::new("127.0.0.1:0".parse().unwrap(), PathBuf::from("dist"));
        let coordinator = Arc::new(ReloadCoordinator::new(Arc::new(NullEngine)));
        let server = DevServer::new(config, coordinator);

        // Route registration panics on malformed paths; building the
        // router at all proves the mount points are valid.
        let _router = server.apply(Router::new());
    }

    #[test]
    fn content_types_cover_bundle_outputs() {
        assert_eq!(content_type_for("bundle.js"), "application/javascript");
        assert_eq!(content_type_for("bundle.js.map"), "application/json");
        assert_eq!(content_type_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("app.css"), "text/css");
        assert_eq!(content_type_for("blob.bin"), "application/octet-stream");
    }

    #[test]
    fn traversal_components_are_rejected() {
        assert!(is_safe_relative(Path::new("index.html")));
        assert!(is_safe_relative(Path::new("assets/app.js")));
        assert!(!is_safe_relative(Path::new("../secrets.txt")));
        assert!(!is_safe_relative(Path::new("assets/../../etc/passwd")));
    }

    #[test]
    fn script_is_injected_before_body_close() {
        let html = b"<html><body><h1>App</h1></body></html>";
        let result = inject_client_script(html, "/__wick_client__.js");
        let text = String::from_utf8(result).unwrap();

        let script_pos = text.find("/__wick_client__.js").unwrap();
        let body_pos = text.find("</body>").unwrap();
        assert!(script_pos < body_pos);
    }

    #[test]
    fn script_is_appended_without_body_tag() {
        let html = b"<html><h1>App</h1></html>";
        let result = inject_client_script(html, "/__wick_client__.js");
        let text = String::from_utf8(result).unwrap();

        assert!(text.ends_with(r#"<script src="/__wick_client__.js"></script>"#));
    }
}
