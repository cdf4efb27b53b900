//! Axum HTTP + WebSocket surface and process-level background tasks.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::client::{self, ConnectionRegistry};
use crate::registry::SessionRegistry;

/// How often the diagnostics task logs registry sizes.
const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(30);

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9470,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionRegistry>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let sessions = Arc::new(SessionRegistry::new());
    let connections = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    let state = AppState {
        sessions: Arc::clone(&sessions),
        connections: Arc::clone(&connections),
    };

    let diagnostics = start_diagnostics_task(sessions, connections, DIAGNOSTICS_INTERVAL);

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "covisit relay started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
        _diagnostics: diagnostics,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _diagnostics: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn, rx) = state.connections.register();
    tracing::info!(conn_id = %conn.id, "client connected");

    client::handle_socket(socket, conn, rx, state.connections, state.sessions).await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.sessions.session_count(),
        "connections": state.connections.count(),
    }))
}

/// Periodically log registry sizes.
fn start_diagnostics_task(
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume first immediate tick
        loop {
            ticker.tick().await;
            tracing::info!(
                sessions = sessions.session_count(),
                connections = connections.count(),
                "active sessions"
            );
        }
    })
}
