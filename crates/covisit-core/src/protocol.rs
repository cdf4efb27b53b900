//! Wire protocol: JSON text frames tagged with a `type` field.
//!
//! Keys are camelCase on the wire (`sessionId`). `sessionId`/`payload` are
//! optional in the Rust shape so a message with a missing field still parses
//! and the router can apply the right rejection policy instead of treating
//! it as malformed input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::code::SessionCode;

/// Sent back for input that is not valid JSON.
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
/// Sent back for JOIN_SESSION without a `sessionId`.
pub const SESSION_ID_REQUIRED: &str = "Session ID is required";
/// Sent back for JOIN_SESSION against an unknown code.
pub const INVALID_SESSION_ID: &str = "Invalid session ID";

/// Messages a client sends to the relay.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "CREATE_SESSION")]
    CreateSession,
    #[serde(rename = "JOIN_SESSION")]
    JoinSession {
        #[serde(rename = "sessionId", default)]
        session_id: Option<SessionCode>,
    },
    #[serde(rename = "VIEW_CUSTOMER")]
    ViewCustomer {
        #[serde(rename = "sessionId", default)]
        session_id: Option<SessionCode>,
        #[serde(default)]
        payload: Option<Value>,
    },
    #[serde(rename = "REQUEST_CUSTOMER_UPDATE")]
    RequestCustomerUpdate {
        #[serde(rename = "sessionId", default)]
        session_id: Option<SessionCode>,
    },
}

/// Outcome of parsing one inbound text frame.
#[derive(Clone, Debug)]
pub enum ParsedMessage {
    /// A recognized protocol message.
    Message(ClientMessage),
    /// Valid JSON that does not fit the protocol (unknown or missing `type`,
    /// wrong field shapes). Ignored by the router.
    Unrecognized,
    /// Not valid JSON at all. Reported to the sender as an ERROR.
    Malformed,
}

/// Parse an inbound frame into the three-tier routing outcome.
pub fn parse_client_message(raw: &str) -> ParsedMessage {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(msg) => ParsedMessage::Message(msg),
        Err(_) => match serde_json::from_str::<Value>(raw) {
            Ok(_) => ParsedMessage::Unrecognized,
            Err(_) => ParsedMessage::Malformed,
        },
    }
}

/// Messages the relay sends to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "SESSION_CREATED")]
    SessionCreated { payload: SessionPayload },
    #[serde(rename = "SESSION_JOINED")]
    SessionJoined { payload: SessionPayload },
    #[serde(rename = "VIEW_CUSTOMER")]
    ViewCustomer { payload: Value },
    #[serde(rename = "ERROR")]
    Error { payload: ErrorPayload },
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionCode,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerMessage {
    pub fn session_created(session_id: SessionCode) -> Self {
        Self::SessionCreated {
            payload: SessionPayload { session_id },
        }
    }

    pub fn session_joined(session_id: SessionCode) -> Self {
        Self::SessionJoined {
            payload: SessionPayload { session_id },
        }
    }

    pub fn view_customer(payload: Value) -> Self {
        Self::ViewCustomer { payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_create_session() {
        let parsed = parse_client_message(r#"{"type":"CREATE_SESSION"}"#);
        assert!(matches!(
            parsed,
            ParsedMessage::Message(ClientMessage::CreateSession)
        ));
    }

    #[test]
    fn parse_join_session_with_code() {
        let parsed = parse_client_message(r#"{"type":"JOIN_SESSION","sessionId":"k7qx2m"}"#);
        match parsed {
            ParsedMessage::Message(ClientMessage::JoinSession { session_id }) => {
                assert_eq!(session_id.unwrap().as_str(), "K7QX2M");
            }
            other => panic!("expected JoinSession, got {other:?}"),
        }
    }

    #[test]
    fn parse_join_session_without_code() {
        let parsed = parse_client_message(r#"{"type":"JOIN_SESSION"}"#);
        match parsed {
            ParsedMessage::Message(ClientMessage::JoinSession { session_id }) => {
                assert!(session_id.is_none());
            }
            other => panic!("expected JoinSession, got {other:?}"),
        }
    }

    #[test]
    fn parse_view_customer() {
        let raw = r#"{"type":"VIEW_CUSTOMER","sessionId":"AB12CD","payload":{"name":"Ada"}}"#;
        match parse_client_message(raw) {
            ParsedMessage::Message(ClientMessage::ViewCustomer {
                session_id,
                payload,
            }) => {
                assert_eq!(session_id.unwrap().as_str(), "AB12CD");
                assert_eq!(payload.unwrap()["name"], "Ada");
            }
            other => panic!("expected ViewCustomer, got {other:?}"),
        }
    }

    #[test]
    fn parse_request_customer_update() {
        let raw = r#"{"type":"REQUEST_CUSTOMER_UPDATE","sessionId":"AB12CD"}"#;
        assert!(matches!(
            parse_client_message(raw),
            ParsedMessage::Message(ClientMessage::RequestCustomerUpdate { .. })
        ));
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let parsed = parse_client_message(r#"{"type":"DELETE_EVERYTHING"}"#);
        assert!(matches!(parsed, ParsedMessage::Unrecognized));
    }

    #[test]
    fn missing_type_is_unrecognized() {
        let parsed = parse_client_message(r#"{"sessionId":"AB12CD"}"#);
        assert!(matches!(parsed, ParsedMessage::Unrecognized));
    }

    #[test]
    fn non_object_json_is_unrecognized() {
        assert!(matches!(
            parse_client_message("42"),
            ParsedMessage::Unrecognized
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_client_message("{nope"),
            ParsedMessage::Malformed
        ));
        assert!(matches!(
            parse_client_message("not json at all"),
            ParsedMessage::Malformed
        ));
    }

    #[test]
    fn session_created_wire_shape() {
        let msg = ServerMessage::session_created(SessionCode::from_raw("K7QX2M"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SESSION_CREATED");
        assert_eq!(json["payload"]["sessionId"], "K7QX2M");
    }

    #[test]
    fn session_joined_wire_shape() {
        let msg = ServerMessage::session_joined(SessionCode::from_raw("K7QX2M"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SESSION_JOINED");
        assert_eq!(json["payload"]["sessionId"], "K7QX2M");
    }

    #[test]
    fn view_customer_payload_is_opaque() {
        let state = serde_json::json!({"id": 7, "notes": ["a", "b"]});
        let msg = ServerMessage::view_customer(state.clone());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "VIEW_CUSTOMER");
        assert_eq!(json["payload"], state);
    }

    #[test]
    fn error_wire_shape() {
        let msg = ServerMessage::error(INVALID_MESSAGE_FORMAT);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["payload"]["message"], "Invalid message format");
    }
}
