use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use verse_presence::{reaper, PresenceStore, ReaperConfig};
use verse_relay::CompletionRelay;
use verse_store::Database;

use crate::client::{self, ClientId, ClientRegistry};
use crate::handlers::HandlerState;
use crate::publisher;
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub reaper: ReaperConfig,
    /// How often dead WebSocket clients are swept.
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9473,
            max_send_queue: 256,
            reaper: ReaperConfig::default(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub registry: Arc<ClientRegistry>,
    pub presence: Arc<PresenceStore>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the
/// background tasks alive and can shut them down.
pub async fn start(
    config: ServerConfig,
    db: Database,
    presence: Arc<PresenceStore>,
    relay: Arc<CompletionRelay>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let shutdown = CancellationToken::new();

    // Presence diff publisher
    let publisher_handle = publisher::start_publisher(Arc::clone(&registry), presence.subscribe());

    // Stale player-state reaper
    let reaper_handle = reaper::start_reaper(
        Arc::clone(&presence),
        config.reaper.clone(),
        shutdown.clone(),
    );

    // Dead-client sweep; evicted clients take their presence along
    let cleanup_handle = start_cleanup_task(
        Arc::clone(&registry),
        Arc::clone(&presence),
        config.cleanup_interval,
        shutdown.clone(),
    );

    // Message processing channel
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(
        db,
        Arc::clone(&registry),
        Arc::clone(&presence),
        relay,
    ));

    // RPC message processor
    let rpc_state = Arc::clone(&handler_state);
    let rpc_registry = Arc::clone(&registry);
    let rpc_handle = tokio::spawn(process_rpc_messages(msg_rx, rpc_state, rpc_registry));

    let app_state = AppState {
        handler_state,
        registry: Arc::clone(&registry),
        presence: Arc::clone(&presence),
        message_tx: msg_tx,
    };

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "verse server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        _server: server_handle,
        _publisher: publisher_handle,
        _reaper: reaper_handle,
        _cleanup: cleanup_handle,
        _rpc: rpc_handle,
    })
}

/// Handle returned by `start()`. Keeps the background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    _server: tokio::task::JoinHandle<()>,
    _publisher: tokio::task::JoinHandle<()>,
    _reaper: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
    _rpc: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Signal the reaper and cleanup tasks to stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    client::handle_ws_connection(
        socket,
        client_id.clone(),
        rx,
        Arc::clone(&state.registry),
        state.message_tx.clone(),
    )
    .await;

    // Explicit disconnect: the user's player state leaves with them.
    if let Some(user_id) = state.registry.unregister(&client_id) {
        state.presence.remove(&user_id);
        tracing::info!(client_id = %client_id, user_id = %user_id, "client disconnected");
    } else {
        tracing::info!(client_id = %client_id, "client disconnected");
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = crate::handlers::dispatch(
        &state.handler_state,
        None,
        "health",
        &serde_json::json!({}),
        None,
    )
    .await;

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, axum::Json(resp.result.unwrap_or_default()))
}

/// Process incoming RPC messages from WebSocket clients.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw_message)) = rx.recv().await {
        let request: RpcRequest = match serde_json::from_str(&raw_message) {
            Ok(req) => req,
            Err(_) => {
                let resp = RpcResponse::parse_error();
                if let Ok(json) = serde_json::to_string(&resp) {
                    registry.send_to(&client_id, json).await;
                }
                continue;
            }
        };

        let params = request.params.unwrap_or(serde_json::json!({}));
        let response = crate::handlers::dispatch(
            &state,
            Some(&client_id),
            &request.method,
            &params,
            request.id,
        )
        .await;

        if let Ok(json) = serde_json::to_string(&response) {
            registry.send_to(&client_id, json).await;
        }
    }
}

/// Periodically sweep dead clients and evict their presence records.
fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    presence: Arc<PresenceStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.cleanup_dead_clients();
                    if !evicted.is_empty() {
                        tracing::info!(removed = evicted.len(), "dead client cleanup");
                    }
                    for user_id in evicted {
                        presence.remove(&user_id);
                    }
                }
            }
        }
    })
}
