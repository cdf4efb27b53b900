//! The authoritative in-memory session map.
//!
//! One `SessionRegistry` per process (or per test — it is plain owned state,
//! no globals). A single coarse `parking_lot::Mutex` around the map makes
//! every operation atomic with respect to the others: concurrent join/leave
//! for the same code can never produce a record that is both present and
//! empty. All operations are simple map mutations and complete in bounded
//! time, so one lock is adequate at this scale.
//!
//! Invariant: a record exists in the map iff its member set is non-empty.
//! `leave` deletes the record the instant the last member goes.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde_json::Value;

use covisit_core::{RegistryError, SessionCode};

use crate::client::ConnectionId;

/// One active collaborative session.
#[derive(Debug, Default)]
struct SessionRecord {
    members: HashSet<ConnectionId>,
    /// Last-known shared customer record; `None` until the first update.
    /// Opaque to the registry.
    shared_state: Option<Value>,
}

/// Maps session codes to their member connections and shared state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionCode, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with `conn` as sole member and no shared state yet.
    /// Codes are regenerated until one is unused, so a create can never
    /// clobber a live session. Infallible.
    pub fn create(&self, conn: &ConnectionId) -> SessionCode {
        let mut sessions = self.sessions.lock();
        let code = loop {
            let candidate = SessionCode::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = SessionRecord {
            members: HashSet::from([conn.clone()]),
            shared_state: None,
        };
        let _ = sessions.insert(code.clone(), record);
        code
    }

    /// Add `conn` to the session and return the current shared state snapshot
    /// for the caller to forward to the joiner.
    pub fn join(
        &self,
        code: &SessionCode,
        conn: &ConnectionId,
    ) -> Result<Option<Value>, RegistryError> {
        let mut sessions = self.sessions.lock();
        let record = sessions
            .get_mut(code)
            .ok_or_else(|| RegistryError::SessionNotFound(code.clone()))?;
        let _ = record.members.insert(conn.clone());
        Ok(record.shared_state.clone())
    }

    /// Replace the shared state and return every member except the caller —
    /// the set the router must notify. Rejects connections that never joined.
    pub fn update(
        &self,
        code: &SessionCode,
        conn: &ConnectionId,
        state: Value,
    ) -> Result<Vec<ConnectionId>, RegistryError> {
        let mut sessions = self.sessions.lock();
        let record = sessions
            .get_mut(code)
            .ok_or_else(|| RegistryError::SessionNotFound(code.clone()))?;
        if !record.members.contains(conn) {
            return Err(RegistryError::NotMember(code.clone()));
        }
        record.shared_state = Some(state);
        Ok(record
            .members
            .iter()
            .filter(|member| *member != conn)
            .cloned()
            .collect())
    }

    /// Read the current shared state without mutating anything.
    pub fn query(
        &self,
        code: &SessionCode,
        _conn: &ConnectionId,
    ) -> Result<Option<Value>, RegistryError> {
        let sessions = self.sessions.lock();
        let record = sessions
            .get(code)
            .ok_or_else(|| RegistryError::SessionNotFound(code.clone()))?;
        Ok(record.shared_state.clone())
    }

    /// Remove `conn` from the session; delete the session when its member
    /// set becomes empty. Idempotent — unknown codes and already-removed
    /// connections are silently ignored, so double cleanup on disconnect is
    /// harmless.
    pub fn leave(&self, code: &SessionCode, conn: &ConnectionId) {
        let mut sessions = self.sessions.lock();
        if let Some(record) = sessions.get_mut(code) {
            let _ = record.members.remove(conn);
            if record.members.is_empty() {
                let _ = sessions.remove(code);
                tracing::info!(session = %code, "session cleaned up");
            }
        }
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Number of members in a session, or `None` if it does not exist.
    pub fn member_count(&self, code: &SessionCode) -> Option<usize> {
        self.sessions.lock().get(code).map(|r| r.members.len())
    }
}
