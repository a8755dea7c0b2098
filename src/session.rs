// Session Store - Explicitly owned split-session lifecycle
// One entry per active split flow; created on entry, discarded on exit/save

use crate::engine::{ReceiptItem, ReceiptMeta, SplitSession};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("split session not found")]
    NotFound,
}

/// In-memory map of active split sessions keyed by UUID.
/// Replaces ambient browser session storage with an owned object whose
/// lifecycle the server controls.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SplitSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a split flow from extracted receipt data. Returns the session id.
    pub fn create(&self, receipt: ReceiptMeta, items: Vec<ReceiptItem>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = SplitSession::new(receipt, items);
        self.sessions.lock().unwrap().insert(id.clone(), session);
        id
    }

    /// Run a closure against one session, returning its result.
    pub fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SplitSession) -> T,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        Ok(f(session))
    }

    /// Snapshot one session's current state.
    pub fn get(&self, id: &str) -> Result<SplitSession, SessionError> {
        self.with_session(id, |session| session.clone())
    }

    /// End a split flow, returning its final state.
    pub fn discard(&self, id: &str) -> Result<SplitSession, SessionError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(id)
            .ok_or(SessionError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReceiptItem;

    fn sample_items() -> Vec<ReceiptItem> {
        vec![ReceiptItem::new("Burger", 500.0)]
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::new();
        let id = store.create(
            ReceiptMeta {
                vendor: "Cafe".to_string(),
                total: 500.0,
                image_url: None,
            },
            sample_items(),
        );

        let session = store.get(&id).unwrap();
        assert_eq!(session.receipt.vendor, "Cafe");
        assert_eq!(session.items.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mutation_through_with_session() {
        let store = SessionStore::new();
        let id = store.create(ReceiptMeta::default(), sample_items());

        store
            .with_session(&id, |session| session.add_participant("Ali").map(|_| ()))
            .unwrap()
            .unwrap();

        assert_eq!(store.get(&id).unwrap().participants.len(), 1);
    }

    #[test]
    fn test_discard_removes_session() {
        let store = SessionStore::new();
        let id = store.create(ReceiptMeta::default(), sample_items());

        let session = store.discard(&id).unwrap();
        assert_eq!(session.items.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.get(&id), Err(SessionError::NotFound));
    }

    // The archive flow snapshots via `get`, inserts, and only discards on
    // success. A failed insert must leave the session behind for a retry.
    #[test]
    fn test_failed_archive_leaves_session_for_retry() {
        use crate::db::{insert_receipt, setup_database, Receipt};
        use rusqlite::Connection;

        let store = SessionStore::new();
        let id = store.create(
            ReceiptMeta {
                vendor: "Cafe".to_string(),
                total: 500.0,
                image_url: None,
            },
            sample_items(),
        );

        let snapshot = store.get(&id).unwrap();
        let receipt = Receipt::new(
            "owner-1",
            &snapshot.receipt.vendor,
            snapshot.receipt.total,
            None,
            snapshot.items,
            snapshot.participants,
        );

        // No schema, so the insert fails; the session must still be there.
        let broken = Connection::open_in_memory().unwrap();
        assert!(insert_receipt(&broken, &receipt).is_err());
        assert!(store.get(&id).is_ok());

        // Retrying against a working database succeeds, then ends the session.
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_receipt(&conn, &receipt).unwrap();
        store.discard(&id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_session_id() {
        let store = SessionStore::new();
        assert_eq!(store.get("nope"), Err(SessionError::NotFound));
        assert_eq!(store.discard("nope").map(|_| ()), Err(SessionError::NotFound));
    }
}
