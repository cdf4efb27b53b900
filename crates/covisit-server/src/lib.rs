//! Session relay server: registry, connection handling, message routing,
//! and the axum WebSocket surface.

pub mod client;
pub mod registry;
pub mod router;
pub mod server;

pub use client::{Connection, ConnectionId, ConnectionRegistry};
pub use registry::SessionRegistry;
pub use server::{start, AppState, ServerConfig, ServerHandle};
