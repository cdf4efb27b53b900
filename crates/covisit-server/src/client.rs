//! Per-connection lifecycle: identity, outbound send queue, session binding,
//! and the WebSocket read/write loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use covisit_core::SessionCode;

use crate::registry::SessionRegistry;
use crate::router;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl ConnectionId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One connected WebSocket client.
///
/// `binding` is the connection's session state machine: empty means unbound,
/// set means bound. It is set at most once — a connection cannot switch
/// sessions; to change sessions a client reconnects.
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    binding: OnceLock<SessionCode>,
    connected: AtomicBool,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            binding: OnceLock::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Bind this connection to a session. Returns false if already bound.
    pub fn bind(&self, code: SessionCode) -> bool {
        self.binding.set(code).is_ok()
    }

    /// The bound session code, if any.
    pub fn binding(&self) -> Option<&SessionCode> {
        self.binding.get()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Registry of all connected clients.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return it with its outbound receiver.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Connection::new(id.clone(), tx));
        self.connections.insert(id, Arc::clone(&conn));
        (conn, rx)
    }

    /// Remove a connection by ID.
    pub fn unregister(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Queue a text frame for a connection. Best-effort: a full queue or a
    /// closed channel drops the frame and returns false — the registry's
    /// bookkeeping never assumes delivery succeeded.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        let Some(conn) = self.connections.get(id) else {
            return false;
        };
        match conn.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    conn_id = %id,
                    msg_len = msg.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

/// Drive one WebSocket connection to completion.
///
/// Spawns a writer task (outbound queue + heartbeat ping) and routes inbound
/// frames inline so a single connection's messages are handled strictly in
/// arrival order. When the socket closes — cleanly or not — the connection is
/// unregistered and `SessionRegistry::leave` runs exactly once with the bound
/// code (a no-op if the connection never bound).
pub async fn handle_socket(
    socket: WebSocket,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<String>,
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, rx, conn.id.clone()));

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                router::route(&sessions, &connections, &conn, text.as_str());
            }
            Ok(WsMessage::Close(_)) => break,
            // axum replies to pings automatically; pongs need no action here.
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
            Ok(_) => {}
            Err(e) => {
                // Transport error: log it; the loop ending is the close path.
                tracing::warn!(conn_id = %conn.id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
    connections.unregister(&conn.id);
    if let Some(code) = conn.binding() {
        sessions.leave(code, &conn.id);
    }
    tracing::info!(conn_id = %conn.id, "client disconnected");
}

/// Writer task: forward queued frames to the socket and ping periodically.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
    conn_id: ConnectionId,
) {
    let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                tracing::trace!(conn_id = %conn_id, "sent ping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique_and_prefixed() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("conn_"));
    }

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let (c1, _rx1) = registry.register();
        let (c2, _rx2) = registry.register();
        assert_eq!(registry.count(), 2);

        registry.unregister(&c1.id);
        assert_eq!(registry.count(), 1);
        assert!(!c1.is_connected());
        assert!(c2.is_connected());
    }

    #[test]
    fn binding_is_set_once() {
        let registry = ConnectionRegistry::new(32);
        let (conn, _rx) = registry.register();
        assert!(conn.binding().is_none());

        assert!(conn.bind(SessionCode::from_raw("AAAAAA")));
        assert!(!conn.bind(SessionCode::from_raw("BBBBBB")));
        assert_eq!(conn.binding().unwrap().as_str(), "AAAAAA");
    }

    #[tokio::test]
    async fn send_to_delivers() {
        let registry = ConnectionRegistry::new(32);
        let (conn, mut rx) = registry.register();

        assert!(registry.send_to(&conn.id, "hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_connection_is_false() {
        let registry = ConnectionRegistry::new(32);
        assert!(!registry.send_to(&ConnectionId::new(), "hello".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = ConnectionRegistry::new(2);
        let (conn, _rx) = registry.register();

        assert!(registry.send_to(&conn.id, "one".into()));
        assert!(registry.send_to(&conn.id, "two".into()));
        assert!(!registry.send_to(&conn.id, "three".into()));
    }

    #[test]
    fn send_to_closed_receiver_is_false() {
        let registry = ConnectionRegistry::new(2);
        let (conn, rx) = registry.register();
        drop(rx);
        assert!(!registry.send_to(&conn.id, "hello".into()));
    }
}
