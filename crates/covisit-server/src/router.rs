//! Translates inbound frames into registry calls and outbound sends.
//!
//! Reporting policy (who hears about a failure):
//! - unparseable input → `ERROR "Invalid message format"` to the sender
//! - JOIN_SESSION with a missing or unknown code → `ERROR` to the sender
//! - VIEW_CUSTOMER / REQUEST_CUSTOMER_UPDATE against a missing session or
//!   from a non-member → dropped, logged only
//! - unrecognized `type` → dropped, logged only
//!
//! No failure here is fatal: the registry and router stay serviceable after
//! any single connection's bad input.

use serde_json::Value;

use covisit_core::protocol::{INVALID_MESSAGE_FORMAT, INVALID_SESSION_ID, SESSION_ID_REQUIRED};
use covisit_core::{parse_client_message, ClientMessage, ParsedMessage, ServerMessage, SessionCode};

use crate::client::{Connection, ConnectionRegistry};
use crate::registry::SessionRegistry;

/// Route one inbound text frame for a connection.
///
/// Callers must invoke this serially per connection (the reader loop does);
/// frames from different connections may route concurrently.
pub fn route(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
    raw: &str,
) {
    match parse_client_message(raw) {
        ParsedMessage::Message(msg) => dispatch(sessions, connections, conn, msg),
        ParsedMessage::Unrecognized => {
            tracing::debug!(conn_id = %conn.id, "ignoring unrecognized message");
        }
        ParsedMessage::Malformed => {
            tracing::debug!(conn_id = %conn.id, "malformed message");
            send(connections, conn, &ServerMessage::error(INVALID_MESSAGE_FORMAT));
        }
    }
}

fn dispatch(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::CreateSession => create_session(sessions, connections, conn),
        ClientMessage::JoinSession { session_id } => {
            join_session(sessions, connections, conn, session_id);
        }
        ClientMessage::ViewCustomer {
            session_id,
            payload,
        } => view_customer(sessions, connections, conn, session_id, payload),
        ClientMessage::RequestCustomerUpdate { session_id } => {
            request_customer_update(sessions, connections, conn, session_id);
        }
    }
}

fn create_session(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
) {
    if conn.binding().is_some() {
        tracing::debug!(conn_id = %conn.id, "already bound; ignoring CREATE_SESSION");
        return;
    }
    let code = sessions.create(&conn.id);
    let _ = conn.bind(code.clone());
    tracing::info!(conn_id = %conn.id, session = %code, "session created");
    send(connections, conn, &ServerMessage::session_created(code));
}

fn join_session(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
    session_id: Option<SessionCode>,
) {
    if conn.binding().is_some() {
        tracing::debug!(conn_id = %conn.id, "already bound; ignoring JOIN_SESSION");
        return;
    }
    let Some(code) = session_id else {
        send(connections, conn, &ServerMessage::error(SESSION_ID_REQUIRED));
        return;
    };
    match sessions.join(&code, &conn.id) {
        Ok(snapshot) => {
            let _ = conn.bind(code.clone());
            tracing::info!(conn_id = %conn.id, session = %code, "client joined session");
            send(connections, conn, &ServerMessage::session_joined(code));
            // Bring the joiner up to date; never broadcast on join.
            if let Some(state) = snapshot {
                send(connections, conn, &ServerMessage::view_customer(state));
            }
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn.id, error = %e, "join rejected");
            send(connections, conn, &ServerMessage::error(INVALID_SESSION_ID));
        }
    }
}

fn view_customer(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
    session_id: Option<SessionCode>,
    payload: Option<Value>,
) {
    let (Some(code), Some(payload)) = (session_id, payload) else {
        tracing::debug!(conn_id = %conn.id, "dropping customer update without session or payload");
        return;
    };
    match sessions.update(&code, &conn.id, payload.clone()) {
        Ok(recipients) => {
            let msg = ServerMessage::view_customer(payload);
            let Ok(json) = serde_json::to_string(&msg) else {
                return;
            };
            for member in &recipients {
                let _ = connections.send_to(member, json.clone());
            }
            tracing::debug!(
                conn_id = %conn.id,
                session = %code,
                recipients = recipients.len(),
                "customer record broadcast"
            );
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn.id, session = %code, error = %e, "dropping customer update");
        }
    }
}

fn request_customer_update(
    sessions: &SessionRegistry,
    connections: &ConnectionRegistry,
    conn: &Connection,
    session_id: Option<SessionCode>,
) {
    let Some(code) = session_id else {
        tracing::debug!(conn_id = %conn.id, "dropping customer request without session");
        return;
    };
    match sessions.query(&code, &conn.id) {
        // No state yet set: no outbound message at all.
        Ok(None) => {}
        Ok(Some(state)) => {
            send(connections, conn, &ServerMessage::view_customer(state));
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn.id, session = %code, error = %e, "dropping customer request");
        }
    }
}

/// Serialize and queue a reply for the originating connection. Send failures
/// (closed or saturated peer) are already logged by the connection registry.
fn send(connections: &ConnectionRegistry, conn: &Connection, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = connections.send_to(&conn.id, json);
    }
}
