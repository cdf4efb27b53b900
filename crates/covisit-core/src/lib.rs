//! Shared types for the covisit relay: session codes, wire protocol, errors.

pub mod code;
pub mod error;
pub mod protocol;

pub use code::SessionCode;
pub use error::RegistryError;
pub use protocol::{parse_client_message, ClientMessage, ParsedMessage, ServerMessage};
