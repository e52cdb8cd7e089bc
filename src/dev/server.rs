//! The dev server's HTTP/WebSocket wiring (spec §4.E): binds one listener,
//! dispatches by URL family, and owns the watcher subscription and HMR
//! broadcaster for the server's lifetime.

use super::hmr::{HmrEvent, HmrFrame};
use super::url::{self, SourceResolution};
use super::watcher::{classify_event, EventKind, WatchAction};
use crate::bundler::Bundler;
use crate::csrf::CsrfBypass;
use crate::fs::FileSystem;
use crate::router::{api_config, build_route_tree, match_route, page_config, RouteNode};
use crate::runtime::ScriptRuntime;
use crate::transform::{Transformer, TransformCache};
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path as AxumPath, Request, State, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tracing::Instrument;

/// Long-lived dev server state (spec §3 "Lifecycle"): trees, the
/// transform cache, the watcher subscription, and the HMR peer set all
/// live for the server's lifetime and are released on shutdown.
pub struct DevServerState {
    pub project_root: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    pub page_tree: RwLock<Arc<RouteNode>>,
    pub api_tree: RwLock<Arc<RouteNode>>,
    pub transformer: Transformer,
    pub transform_cache: TransformCache,
    pub bundler: Arc<dyn Bundler>,
    pub runtime: Arc<dyn ScriptRuntime>,
    pub csrf_bypass: CsrfBypass,
    pub hmr_tx: broadcast::Sender<HmrFrame>,
}

pub struct DevServer {
    state: Arc<DevServerState>,
    port: u16,
}

impl DevServer {
    pub async fn build(
        project_root: PathBuf,
        fs: Arc<dyn FileSystem>,
        transformer: Transformer,
        transform_cache: TransformCache,
        bundler: Arc<dyn Bundler>,
        runtime: Arc<dyn ScriptRuntime>,
        csrf_bypass: CsrfBypass,
        port: u16,
    ) -> Result<Self> {
        let page_tree = build_route_tree(fs.as_ref(), &project_root.join("src/pages"), &page_config())
            .await
            .context("building the initial page route tree")?;
        let api_tree = build_route_tree(fs.as_ref(), &project_root.join("src/api"), &api_config())
            .await
            .context("building the initial API route tree")?;
        let (hmr_tx, _) = broadcast::channel(256);

        let state = Arc::new(DevServerState {
            project_root,
            fs,
            page_tree: RwLock::new(Arc::new(page_tree)),
            api_tree: RwLock::new(Arc::new(api_tree)),
            transformer,
            transform_cache,
            bundler,
            runtime,
            csrf_bypass,
            hmr_tx,
        });

        Ok(Self { state, port })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/@deps/{*name}", get(handle_deps))
            .route("/@src/{*path}", get(handle_src))
            .route("/api/__rpc/{*rest}", any(handle_rpc))
            .route("/hmr", get(handle_hmr_upgrade))
            .route("/peaque-dev.js", get(handle_peaque_dev_js))
            .route("/peaque-loader.js", get(handle_peaque_loader_js))
            .route("/peaque.js", get(handle_peaque_js))
            .route("/peaque.css", get(handle_peaque_css))
            .fallback(any(handle_fallback))
            .layer(middleware::from_fn(log_request))
            .with_state(self.state.clone())
    }

    /// Handle one watcher event, rebuilding trees and broadcasting HMR as
    /// spec §4.E's table dictates.
    pub async fn on_watch_event(&self, path: &str, kind: EventKind) -> Result<()> {
        match classify_event(path, kind) {
            WatchAction::RebuildPagesAndBroadcastRouter => {
                self.rebuild_page_tree().await?;
                let _ = self.state.hmr_tx.send(HmrFrame::router_changed());
            }
            WatchAction::RebuildPagesAndRefreshComponent { path } => {
                self.rebuild_page_tree().await?;
                let _ = self.state.hmr_tx.send(HmrFrame::new(HmrEvent::Update, path));
            }
            WatchAction::RebuildApi => {
                self.rebuild_api_tree().await?;
            }
            WatchAction::ReloadJobs => {
                // Jobs execute through the generated backend entry at
                // production time; in dev, reloading is a no-op for the
                // Rust core beyond invalidating any cached job listing.
            }
            WatchAction::RefreshComponent { path } => {
                let _ = self.state.hmr_tx.send(HmrFrame::new(HmrEvent::Update, path));
            }
            WatchAction::Ignore => {}
        }
        Ok(())
    }

    async fn rebuild_page_tree(&self) -> Result<()> {
        let tree = build_route_tree(
            self.state.fs.as_ref(),
            &self.state.project_root.join("src/pages"),
            &page_config(),
        )
        .await?;
        *self.state.page_tree.write().await = Arc::new(tree);
        Ok(())
    }

    async fn rebuild_api_tree(&self) -> Result<()> {
        let tree = build_route_tree(
            self.state.fs.as_ref(),
            &self.state.project_root.join("src/api"),
            &api_config(),
        )
        .await?;
        *self.state.api_tree.write().await = Arc::new(tree);
        Ok(())
    }

    /// Log the `local:`/`network:` startup lines (spec §4.E "Startup";
    /// grounded on trunk's `serve::show_listening`). The caller owns the
    /// listener bind itself so it can layer watcher lifecycle and
    /// graceful shutdown around it.
    pub fn log_listening(&self) {
        tracing::info!("{}local:   http://localhost:{}", crate::common::SERVER, self.port);
        if let Ok(network_ip) = local_ip_address::local_ip() {
            tracing::info!("{}network: http://{network_ip}:{}", crate::common::SERVER, self.port);
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Record a per-request span (method/path/status/elapsed, spec §4.K) and,
/// when `PEAQUE_PERF_LOG` names a threshold the request's elapsed time
/// clears, emit a `tracing::warn!` carrying the same timing breakdown.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let span = tracing::info_span!("request", %method, %path, status = tracing::field::Empty, elapsed_ms = tracing::field::Empty);
    async move {
        let response = next.run(req).await;
        let elapsed = start.elapsed();
        let status = response.status().as_u16();
        let elapsed_ms = elapsed.as_millis() as u64;
        tracing::Span::current().record("status", status).record("elapsed_ms", elapsed_ms);
        if let Some(threshold) = crate::common::parse_perf_log_threshold(std::env::var("PEAQUE_PERF_LOG").ok().as_deref()) {
            if elapsed > threshold {
                tracing::warn!(%method, %path, status, elapsed_ms, "slow request");
            }
        }
        response
    }
    .instrument(span)
    .await
}

async fn handle_deps(
    State(state): State<Arc<DevServerState>>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    match state
        .bundler
        .bundle(&format!("export * from \"{name}\";"), &state.project_root, &state.project_root.join(".peaque-cache"), false)
        .await
    {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "application/javascript")],
            output.js,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!("bundling dependency {name} failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_src(
    State(state): State<Arc<DevServerState>>,
    AxumPath(requested): AxumPath<String>,
) -> Response {
    match url::resolve_source_candidate(state.fs.as_ref(), &state.project_root, &requested).await {
        SourceResolution::Escaped => StatusCode::FORBIDDEN.into_response(),
        SourceResolution::NotFound => StatusCode::NOT_FOUND.into_response(),
        SourceResolution::Found(path) => {
            let Ok(source) = state.fs.read_text(&path).await else {
                return StatusCode::NOT_FOUND.into_response();
            };
            let module_path = path
                .strip_prefix(&state.project_root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let hash = crate::transform::content_hash(source.as_bytes());
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let produced = state
                .transform_cache
                .get_or_produce(&module_path, &hash, now, || async {
                    match state.transformer.transform(&source, &module_path) {
                        Ok(transformed) => Ok(transformed.into_bytes()),
                        Err(err) => Ok(format!("throw new Error({:?});", err.to_string()).into_bytes()),
                    }
                })
                .await;
            match produced {
                Ok(bytes) => (StatusCode::OK, [("content-type", "application/javascript")], bytes).into_response(),
                Err(err) => {
                    tracing::warn!("transform cache failed for {module_path}: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
    }
}

async fn handle_rpc(
    State(state): State<Arc<DevServerState>>,
    method: Method,
    AxumPath(rest): AxumPath<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    match crate::actions::dispatch(
        state.runtime.as_ref(),
        &method,
        &rest,
        &headers,
        &state.csrf_bypass,
        &payload,
    )
    .await
    {
        Ok(crate::actions::DispatchOutcome::Forbidden) => (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({"error": "Forbidden: Cross-origin request rejected"})),
        )
            .into_response(),
        Ok(crate::actions::DispatchOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Ok(crate::actions::DispatchOutcome::Ok(value)) => axum::Json(value).into_response(),
        Ok(crate::actions::DispatchOutcome::Thrown(message)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        Err(err) => {
            tracing::error!("RPC dispatch failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_hmr_upgrade(
    State(state): State<Arc<DevServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let rx = state.hmr_tx.subscribe();
    ws.on_upgrade(move |socket| handle_hmr_socket(socket, rx))
}

async fn handle_hmr_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<HmrFrame>) {
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                if incoming.is_none() {
                    return;
                }
            }
            frame = rx.recv() => {
                let Ok(frame) = frame else { return };
                if socket.send(Message::Text(frame.to_json().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// The fast-refresh runtime (spec §4.E row `/peaque-dev.js`): the two
/// hooks [`crate::transform::fast_refresh::wrap`] injects into every
/// transformed module. `registerRefreshScope` remembers which scope a
/// module's exports belong to; `performRefresh` is called after the
/// module body has re-executed and swaps the new implementations into
/// any still-mounted instances without losing component state.
async fn handle_peaque_dev_js() -> Response {
    const SOURCE: &str = r#"const __peaque_scopes = new Map();

export function registerRefreshScope(modulePath) {
  if (!__peaque_scopes.has(modulePath)) {
    __peaque_scopes.set(modulePath, { generation: 0 });
  }
  return __peaque_scopes.get(modulePath);
}

export function performRefresh(modulePath) {
  const scope = __peaque_scopes.get(modulePath);
  if (!scope) return;
  scope.generation += 1;
  window.dispatchEvent(new CustomEvent("peaque:refresh", { detail: { modulePath } }));
}
"#;
    (StatusCode::OK, [("content-type", "application/javascript")], SOURCE).into_response()
}

/// The HMR client bootstrap (spec §4.E row `/peaque-loader.js`): opens
/// the `/hmr` WebSocket and reacts to the two frame kinds
/// [`HmrFrame`] can carry — `change` re-imports the route table
/// (the whole app re-mounts), `update` re-imports the one changed
/// module and lets fast-refresh apply the new implementation in place.
async fn handle_peaque_loader_js() -> Response {
    const SOURCE: &str = r#"const __peaque_socket = new WebSocket(`ws://${location.host}/hmr`);

__peaque_socket.addEventListener("message", (event) => {
  const frame = JSON.parse(event.data);
  const { event: kind, path } = frame.data;
  const url = `${path}?t=${Date.now()}`;
  if (kind === "change") {
    import(url).catch((err) => console.error("[peaque] failed to reload", path, err));
  } else {
    import(url)
      .then(() => window.dispatchEvent(new CustomEvent("peaque:refresh", { detail: { modulePath: path } })))
      .catch((err) => console.error("[peaque] failed to refresh", path, err));
  }
});
"#;
    (StatusCode::OK, [("content-type", "application/javascript")], SOURCE).into_response()
}

/// The generated frontend entry (spec §4.E row `/peaque.js`), rebuilt
/// fresh from the current page tree on every request so it always
/// reflects the latest structural state — the same generator the
/// production builder uses (spec §4.H step 1), just invoked live
/// instead of once at build time.
async fn handle_peaque_js(State(state): State<Arc<DevServerState>>) -> Response {
    let page_tree = state.page_tree.read().await.clone();
    let routes = crate::build::collect_page_routes(&page_tree);
    let source = crate::build::generate_frontend_entry(&routes);
    (StatusCode::OK, [("content-type", "application/javascript")], source).into_response()
}

/// The framework's base stylesheet (spec §4.E row `/peaque.css`): a
/// minimal reset so page components don't inherit the browser's
/// default form/typography styling. Served with a real `text/css`
/// content type, unlike the other three JS assets on this row.
async fn handle_peaque_css() -> Response {
    const SOURCE: &str = r#"html, body {
  margin: 0;
  padding: 0;
}

*, *::before, *::after {
  box-sizing: border-box;
}

#root {
  min-height: 100vh;
}
"#;
    (StatusCode::OK, [("content-type", "text/css")], SOURCE).into_response()
}

async fn handle_fallback(
    State(state): State<Arc<DevServerState>>,
    method: Method,
    headers: HeaderMap,
    uri: axum::http::Uri,
) -> Response {
    let public_path = state.project_root.join("src/public").join(uri.path().trim_start_matches('/'));
    if let Ok(bytes) = state.fs.read_bytes(&public_path).await {
        let mime = mime_guess::from_path(&public_path).first_or_octet_stream();
        return (StatusCode::OK, [("content-type", mime.as_ref())], bytes).into_response();
    }

    let api_tree = state.api_tree.read().await.clone();
    if let Some(found) = match_route(&api_tree, uri.path()) {
        if let Some(handler) = found.names.get("handler") {
            let middleware = crate::router::MiddlewareChain::for_node(found.node)
                .files
                .iter()
                .map(|f| crate::common::strip_js_extension(&f.path.to_string_lossy().replace('\\', "/")).to_string())
                .collect::<Vec<_>>();
            return dispatch_to_api_handler(&state, &method, &headers, uri.path(), &handler.path, &middleware).await;
        }
    }

    let page_tree = state.page_tree.read().await.clone();
    if match_route(&page_tree, uri.path()).is_some() {
        return spa_shell(&state).await;
    }

    spa_shell(&state).await
}

/// Load and dispatch a matched API handler (spec §4.E row `/api/…`):
/// parse its exports to confirm `method` is actually served, then invoke
/// it through the script runtime.
async fn dispatch_to_api_handler(
    state: &DevServerState,
    method: &Method,
    headers: &HeaderMap,
    path: &str,
    handler_path: &PathBuf,
    middleware: &[String],
) -> Response {
    let Ok(source) = state.fs.read_text(handler_path).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let module_path = crate::common::strip_js_extension(
        &handler_path
            .strip_prefix(&state.project_root)
            .unwrap_or(handler_path)
            .to_string_lossy()
            .replace('\\', "/"),
    )
    .to_string();

    let parser = crate::transform::parser::SwcModuleParser;
    match crate::actions::dispatch_api(state.runtime.as_ref(), &parser, &source, method, &module_path, path, headers, middleware).await {
        Ok(crate::actions::DispatchOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Ok(crate::actions::DispatchOutcome::Forbidden) => StatusCode::FORBIDDEN.into_response(),
        Ok(crate::actions::DispatchOutcome::Ok(value)) => axum::Json(value).into_response(),
        Ok(crate::actions::DispatchOutcome::Thrown(message)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        Err(err) => {
            tracing::error!("API dispatch failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn spa_shell(state: &DevServerState) -> Response {
    let shell_path = state.project_root.join("src/public/index.html");
    match state.fs.read_text(&shell_path).await {
        Ok(html) => (StatusCode::OK, [("content-type", "text/html")], html).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
