use crate::code::SessionCode;

/// Errors returned by session registry operations.
///
/// Both variants are recoverable per-connection conditions. The router
/// decides how each is reported: join failures go back to the sender as an
/// `ERROR` message, update/query failures are logged and dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionCode),
    #[error("connection is not a member of session {0}")]
    NotMember(SessionCode),
}
